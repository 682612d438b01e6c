use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Run mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Dev,
    Prod,
}

impl RunMode {
    fn app_name(self) -> &'static str {
        match self {
            RunMode::Dev => "roozane-dev",
            RunMode::Prod => "roozane",
        }
    }
}

/// Get the configuration directory path.
/// Dev mode uses a separate "roozane-dev" directory so a development
/// database never touches real data.
pub fn get_config_dir(mode: RunMode) -> Option<PathBuf> {
    ProjectDirs::from("com", "roozane", mode.app_name()).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path (where the SQLite database lives).
pub fn get_data_dir(mode: RunMode) -> Option<PathBuf> {
    ProjectDirs::from("com", "roozane", mode.app_name()).map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if path.starts_with("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(&path[2..]);
        }
    }
    PathBuf::from(path)
}
