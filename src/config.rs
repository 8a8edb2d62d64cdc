use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PreviewError, Result};

/// Port used when a script is run through the debug console.
pub const CONSOLE_PORT: u16 = 8159;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PreviewTarget {
    Browser,
    #[serde(rename = "inapp")]
    #[value(name = "inapp")]
    InApp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleEngine {
    /// Console build bundled with the assets.
    Legacy,
    /// Externally downloaded eruda library in the data directory.
    Eruda,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOrder {
    Fifo,
    /// Most recently queued delivery first; older ones wait for later cycles.
    Latest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_port: u16,
    pub preview_port: u16,
    pub preview_mode: PreviewTarget,
    pub disable_cache: bool,
    pub host: String,
    pub console: ConsoleEngine,
    pub markdown_style: Option<String>,
    pub show_console_toggler: bool,
    pub send_order: DrainOrder,
    pub max_bind_attempts: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_port: 8158,
            preview_port: 8158,
            preview_mode: PreviewTarget::InApp,
            disable_cache: false,
            host: "localhost".to_string(),
            console: ConsoleEngine::Eruda,
            markdown_style: None,
            show_console_toggler: true,
            send_order: DrainOrder::Fifo,
            max_bind_attempts: 32,
        }
    }
}

impl Settings {
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PreviewError::Config(format!("{}: {e}", path.display())))?;
        let settings: Settings = serde_json::from_slice(&bytes)
            .map_err(|e| PreviewError::Config(format!("{}: {e}", path.display())))?;
        if settings.max_bind_attempts == 0 {
            return Err(PreviewError::Config(
                "max_bind_attempts must be at least 1".to_string(),
            ));
        }
        Ok(settings)
    }
}

/// Directories the server reads bundled assets from and writes cache files to.
#[derive(Clone, Debug)]
pub struct Paths {
    pub assets_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Paths {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            assets_dir: root.join("assets"),
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
        }
    }

    pub fn legacy_console_script(&self) -> PathBuf {
        self.assets_dir.join("js").join("build").join("console.build.js")
    }

    pub fn eruda_script(&self) -> PathBuf {
        self.data_dir.join("eruda.js")
    }

    pub fn favicon(&self) -> PathBuf {
        self.assets_dir.join("res").join("logo").join("favicon.ico")
    }

    pub fn console_www(&self) -> PathBuf {
        self.assets_dir.join("www")
    }
}

pub fn default_root_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let t = home.trim();
    if t.is_empty() {
        return None;
    }
    Some(PathBuf::from(t).join(".livepreview"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_in_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"preview_mode":"browser","console":"legacy"}"#).unwrap();
        assert_eq!(settings.preview_mode, PreviewTarget::Browser);
        assert_eq!(settings.console, ConsoleEngine::Legacy);
        assert_eq!(settings.server_port, 8158);
        assert_eq!(settings.send_order, DrainOrder::Fifo);
        assert!(settings.show_console_toggler);
    }

    #[tokio::test]
    async fn load_rejects_zero_bind_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, r#"{"max_bind_attempts":0}"#).await.unwrap();
        assert!(matches!(
            Settings::load(&path).await,
            Err(PreviewError::Config(_))
        ));
    }

    #[test]
    fn asset_paths_hang_off_their_roots() {
        let paths = Paths::under("/srv/preview");
        assert_eq!(
            paths.legacy_console_script(),
            PathBuf::from("/srv/preview/assets/js/build/console.build.js")
        );
        assert_eq!(paths.eruda_script(), PathBuf::from("/srv/preview/data/eruda.js"));
        assert_eq!(
            paths.favicon(),
            PathBuf::from("/srv/preview/assets/res/logo/favicon.ico")
        );
    }
}
