//! Filesystem locations for metabridge state.
//!
//! The base directory defaults to `~/.metabridge` and can be overridden with
//! the `METABRIDGE_DIR` environment variable. Directories are created on
//! first access.

use std::env;
use std::io;
use std::path::PathBuf;

/// Name of the environment variable overriding the base directory.
pub const DIR_ENV: &str = "METABRIDGE_DIR";

/// Returns the base directory where metabridge files are stored.
///
/// # Errors
///
/// Returns an I/O error when the home directory cannot be resolved or the
/// directory cannot be created.
pub fn metabridge_dir() -> io::Result<PathBuf> {
    let dir = match env::var(DIR_ENV) {
        Ok(value) if !value.is_empty() => PathBuf::from(value),
        _ => dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "home directory not found"))?
            .join(".metabridge"),
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the directory where saved tool definitions are stored.
///
/// # Errors
///
/// Propagates errors from [`metabridge_dir`] and directory creation.
pub fn tools_dir() -> io::Result<PathBuf> {
    let dir = metabridge_dir()?.join("tools");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the full path of the `servers.json` configuration file.
///
/// # Errors
///
/// Propagates errors from [`metabridge_dir`].
pub fn config_path() -> io::Result<PathBuf> {
    Ok(metabridge_dir()?.join("servers.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_creates_and_uses_directory() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let base = tmp.path().join("custom");
        // Safety: test-local override, restored below.
        unsafe { env::set_var(DIR_ENV, &base) };

        let dir = metabridge_dir().expect("base dir");
        assert_eq!(dir, base);
        assert!(dir.is_dir());

        let tools = tools_dir().expect("tools dir");
        assert_eq!(tools, base.join("tools"));
        assert!(tools.is_dir());

        let config = config_path().expect("config path");
        assert_eq!(config, base.join("servers.json"));

        unsafe { env::remove_var(DIR_ENV) };
    }
}
