use std::path::PathBuf;

use serde::Deserialize;

/// Image store configuration shared by the server and its tests.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Root directory of the image store. Default: "image_store".
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("image_store")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

/// External tool configuration.
///
/// Block commands come from the block catalogue per block type; the
/// thumbnailer is the one binary configured globally.
#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    /// Thumbnailer binary, invoked as
    /// `[thumbnailer, source, target, width, ...constraints]`.
    /// Default: "vipsthumbnail".
    #[serde(default = "default_thumbnailer")]
    pub thumbnailer: PathBuf,
}

fn default_thumbnailer() -> PathBuf {
    PathBuf::from("vipsthumbnail")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            thumbnailer: default_thumbnailer(),
        }
    }
}
