use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use livepreview::{
    config::{default_root_dir, Paths, PreviewTarget, Settings},
    locator::Locator,
    workspace::{Document, MemoryWorkspace},
    Collaborators, Preview, RunOptions, RunOutcome,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "livepreview")]
struct Args {
    /// Settings file (default: <root>/settings.json when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root for assets, data and cache (default: ~/.livepreview)
    #[arg(long)]
    root_dir: Option<PathBuf>,

    /// Document to preview
    #[arg(long)]
    file: Option<PathBuf>,

    /// Project folder the document belongs to (repeatable)
    #[arg(long)]
    folder: Vec<PathBuf>,

    /// Open the debug console instead of the document
    #[arg(long)]
    console: bool,

    /// Preview the file itself even when its folder has an index.html
    #[arg(long)]
    run_file: bool,

    /// Where to present the preview
    #[arg(long, value_enum)]
    target: Option<PreviewTarget>,

    #[arg(long)]
    host: Option<String>,

    /// First port to try for the preview server
    #[arg(long)]
    port: Option<u16>,

    /// Port of an already running preview server
    #[arg(long)]
    preview_port: Option<u16>,

    /// Always fetch remote files instead of reusing cached copies
    #[arg(long)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let root = match args.root_dir {
        Some(p) => p,
        None => default_root_dir().context("unable to determine default root dir")?,
    };
    let paths = Paths::under(&root);
    tokio::fs::create_dir_all(&paths.cache_dir)
        .await
        .context("create cache_dir")?;

    let config = args.config.or_else(|| {
        let p = root.join("settings.json");
        p.is_file().then_some(p)
    });
    let mut settings = match config {
        Some(p) => Settings::load(&p).await.context("load settings")?,
        None => Settings::default(),
    };
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        // Without an explicit preview port, keep the two equal so no delegation happens.
        if args.preview_port.is_none() && settings.preview_port == settings.server_port {
            settings.preview_port = port;
        }
        settings.server_port = port;
    }
    if let Some(port) = args.preview_port {
        settings.preview_port = port;
    }
    settings.disable_cache |= args.no_cache;

    let workspace = Arc::new(MemoryWorkspace::new());
    for folder in &args.folder {
        let folder = tokio::fs::canonicalize(folder)
            .await
            .with_context(|| format!("resolve folder {}", folder.display()))?;
        workspace.add_folder(Locator::from_path(&folder));
    }
    if let Some(file) = &args.file {
        let file = tokio::fs::canonicalize(file)
            .await
            .with_context(|| format!("resolve file {}", file.display()))?;
        let text = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("read {}", file.display()))?;
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("file has no name")?;
        workspace.open(
            Document::new(file.to_string_lossy(), filename, text).with_uri(Locator::from_path(&file)),
        );
    }

    let mut preview = Preview::new(settings, paths, Collaborators::system(workspace));
    let outcome = preview
        .run(RunOptions {
            console: args.console,
            target: args.target,
            run_file: args.run_file,
        })
        .await
        .context("start preview")?;

    match outcome {
        RunOutcome::Serving { url, .. } => info!("serving {url}"),
        RunOutcome::DelegatedToPreview { url } => {
            info!("opened the running preview server at {url}");
            return Ok(());
        }
        RunOutcome::NotRunnable => anyhow::bail!("nothing to preview: pass --file or --console"),
    }

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");
    preview.stop().await;
    Ok(())
}
