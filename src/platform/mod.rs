use std::path::{Path, PathBuf};

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Return PIDs of processes listening on `port`.
    fn find_pids_on_port(port: u16) -> Vec<String>;

    /// Root data directory for noisett.
    /// Unix: `~/.noisett`, Windows: `%APPDATA%\noisett`.
    fn data_dir() -> PathBuf;
}

pub const DATA_DIR_ENV: &str = "NOISETT_DATA_DIR";

/// `NOISETT_DATA_DIR` wins over the platform default.
pub(crate) fn resolve_data_dir(default: PathBuf) -> PathBuf {
    resolve_data_dir_with(default, std::env::var(DATA_DIR_ENV).ok())
}

fn resolve_data_dir_with(default: PathBuf, override_dir: Option<String>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => default,
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
