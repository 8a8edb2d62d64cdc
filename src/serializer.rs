use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::future::BoxFuture;

use crate::config::DrainOrder;

pub type SendTask = BoxFuture<'static, ()>;

struct Gate {
    busy: bool,
    backlog: VecDeque<SendTask>,
}

/// Lets at most one file delivery run at a time.
///
/// A task enqueued while another runs goes to the backlog. Each completion
/// clears the gate and starts exactly one backlog entry, chosen by
/// [`DrainOrder`]. With `DrainOrder::Latest` that is the most recently queued
/// entry: older entries only run once every newer one has finished, so under
/// steady contention they can wait indefinitely, and nothing bounds the
/// backlog length.
pub struct SendSerializer {
    order: DrainOrder,
    gate: Mutex<Gate>,
}

impl SendSerializer {
    pub fn new(order: DrainOrder) -> Arc<Self> {
        Arc::new(Self {
            order,
            gate: Mutex::new(Gate {
                busy: false,
                backlog: VecDeque::new(),
            }),
        })
    }

    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(self: &Arc<Self>, task: SendTask) {
        {
            let mut gate = self.gate();
            if gate.busy {
                gate.backlog.push_back(task);
                return;
            }
            gate.busy = true;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drain(task).await });
    }

    pub fn is_busy(&self) -> bool {
        self.gate().busy
    }

    pub fn backlog_len(&self) -> usize {
        self.gate().backlog.len()
    }

    async fn drain(&self, mut task: SendTask) {
        loop {
            task.await;
            let next = {
                let mut gate = self.gate();
                gate.busy = false;
                let next = match self.order {
                    DrainOrder::Fifo => gate.backlog.pop_front(),
                    DrainOrder::Latest => gate.backlog.pop_back(),
                };
                if next.is_some() {
                    gate.busy = true;
                }
                next
            };
            match next {
                Some(t) => task = t,
                None => break,
            }
        }
    }
}
