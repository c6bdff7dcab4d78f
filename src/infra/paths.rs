// src/infra/paths.rs — Config and data locations
//
// All paths respect the SYNAPSE_HOME environment variable for isolation.
// When SYNAPSE_HOME is set, config and data live under that directory.
// When unset, config uses ~/.synapse/ and data uses XDG_DATA_HOME/synapse.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the SYNAPSE_HOME override, if set.
fn synapse_home() -> Option<PathBuf> {
    std::env::var_os("SYNAPSE_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $SYNAPSE_HOME/ or ~/.synapse/
pub fn config_dir() -> PathBuf {
    if let Some(home) = synapse_home() {
        return home;
    }
    dirs_home().join(".synapse")
}

/// Data directory: $SYNAPSE_HOME/data/ or ~/.local/share/synapse/
pub fn data_dir() -> PathBuf {
    if let Some(home) = synapse_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "synapse")
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Database holding persisted blobs (codebook, vocabulary, skills, ...)
pub fn db_path() -> PathBuf {
    data_dir().join("synapse.db")
}

/// Ensure the data directory exists.
pub fn ensure_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(data_dir())
}
