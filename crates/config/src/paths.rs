//! Filesystem locations

use std::path::PathBuf;

/// Data directory (`~/.agentry`, or `./.agentry` when no home is known)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".agentry"))
        .unwrap_or_else(|| PathBuf::from(".agentry"))
}

/// Configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Optional `.env` file next to the configuration
pub fn env_file_path() -> PathBuf {
    data_dir().join(".env")
}
