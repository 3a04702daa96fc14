// ABOUTME: XDG Base Directory paths for cross-platform config and data storage
// ABOUTME: Provides standardized paths for logs, the group database, and configuration

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "raduno";
const APPLICATION: &str = "raduno";

/// Get XDG-compliant directories for the application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Get the data directory path (e.g., ~/.local/share/raduno/)
/// Falls back to ./data if XDG directories unavailable
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Get the log directory path (inside data dir)
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Where the rolling log file goes given the LOG_DIR setting: unset means
/// [`log_dir`], blank or `off` disables file logging, anything else is the path
pub fn resolve_log_dir(setting: Option<&str>) -> Option<PathBuf> {
    match setting.map(str::trim) {
        None => Some(log_dir()),
        Some("") => None,
        Some(s) if s.eq_ignore_ascii_case("off") => None,
        Some(s) => Some(PathBuf::from(s)),
    }
}

/// Get the config directory path (e.g., ~/.config/raduno/)
/// Falls back to current directory if XDG directories unavailable
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default config file path
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
