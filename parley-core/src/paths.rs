// ABOUTME: XDG Base Directory paths for config, logs and the reminder file.
// ABOUTME: Falls back to directories under the working directory when XDG is unavailable.

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "parley";
const APPLICATION: &str = "parley";

/// Get XDG-compliant directories for the application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Data directory (e.g., ~/.local/share/parley/), or ./data
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// e.g., ~/.local/share/parley/logs/
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Config directory (e.g., ~/.config/parley/), or the current directory
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// e.g., ~/.config/parley/parley.toml
pub fn config_file() -> PathBuf {
    config_dir().join("parley.toml")
}

/// Default markdown reminder file used by the offline CLI
pub fn reminders_file() -> PathBuf {
    data_dir().join("reminders.md")
}
