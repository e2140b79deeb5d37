//! Configuration for coderecall
//!
//! All environment-derived paths are resolved exactly once, at startup, into
//! an immutable [`Config`] value. Adapters receive their roots at
//! construction and never consult the environment mid-operation.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};

use crate::error::{CoderecallError, Result};

/// Environment variable overriding the search index cache database path.
///
/// This makes it easy to point the binary at a test cache or alternate file
/// without changing the user's cache directory.
pub const CACHE_DB_ENV: &str = "CODERECALL_CACHE_DB";

/// Resolved filesystem layout for every session source plus the index cache.
#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub Copilot CLI JSONL session files (`~/.copilot/session-state`)
    pub copilot_sessions_dir: PathBuf,
    /// Mistral Vibe JSON session files (`~/.vibe/logs/session`)
    pub mistral_sessions_dir: PathBuf,
    /// opencode canonical SQLite database (`~/.local/share/opencode/opencode.db`)
    pub opencode_db_path: PathBuf,
    /// opencode legacy flat-file storage (`~/.local/share/opencode/storage`)
    pub opencode_storage_dir: PathBuf,
    /// Durable search index cache database
    pub cache_db_path: PathBuf,
}

impl Config {
    /// Resolve the default layout from the user's home and cache directories.
    ///
    /// # Errors
    ///
    /// Returns an error when neither a home directory nor a cache directory
    /// can be determined for the current user.
    pub fn resolve() -> Result<Self> {
        let base = BaseDirs::new().ok_or_else(|| {
            CoderecallError::BackendUnavailable("could not determine home directory".into())
        })?;
        let home = base.home_dir();

        let cache_db_path = match std::env::var(CACHE_DB_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => {
                let proj = ProjectDirs::from("com", "coderecall", "coderecall").ok_or_else(
                    || {
                        CoderecallError::BackendUnavailable(
                            "could not determine cache directory".into(),
                        )
                    },
                )?;
                proj.cache_dir().join("search.db")
            }
        };

        let opencode_base = home.join(".local").join("share").join("opencode");

        Ok(Self {
            copilot_sessions_dir: home.join(".copilot").join("session-state"),
            mistral_sessions_dir: home.join(".vibe").join("logs").join("session"),
            opencode_db_path: opencode_base.join("opencode.db"),
            opencode_storage_dir: opencode_base.join("storage"),
            cache_db_path,
        })
    }

    /// Build a layout rooted at an arbitrary directory.
    ///
    /// This is primarily useful for tests where the user's real home
    /// directory is not desirable (for example, a temporary directory).
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        let opencode_base = root.join(".local").join("share").join("opencode");
        Self {
            copilot_sessions_dir: root.join(".copilot").join("session-state"),
            mistral_sessions_dir: root.join(".vibe").join("logs").join("session"),
            opencode_db_path: opencode_base.join("opencode.db"),
            opencode_storage_dir: opencode_base.join("storage"),
            cache_db_path: root.join("cache").join("search.db"),
        }
    }

    /// Replace the cache database path, keeping everything else.
    pub fn with_cache_db<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_db_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_with_root_layout() {
        let config = Config::with_root("/tmp/fake-home");
        assert_eq!(
            config.copilot_sessions_dir,
            PathBuf::from("/tmp/fake-home/.copilot/session-state")
        );
        assert_eq!(
            config.mistral_sessions_dir,
            PathBuf::from("/tmp/fake-home/.vibe/logs/session")
        );
        assert_eq!(
            config.opencode_db_path,
            PathBuf::from("/tmp/fake-home/.local/share/opencode/opencode.db")
        );
        assert_eq!(
            config.opencode_storage_dir,
            PathBuf::from("/tmp/fake-home/.local/share/opencode/storage")
        );
    }

    #[test]
    #[serial]
    fn test_cache_db_env_override() {
        std::env::set_var(CACHE_DB_ENV, "/tmp/override/search.db");
        let config = Config::resolve().expect("resolve config");
        assert_eq!(config.cache_db_path, PathBuf::from("/tmp/override/search.db"));
        std::env::remove_var(CACHE_DB_ENV);
    }

    #[test]
    #[serial]
    fn test_cache_db_default_when_env_unset() {
        std::env::remove_var(CACHE_DB_ENV);
        let config = Config::resolve().expect("resolve config");
        assert!(config.cache_db_path.ends_with("search.db"));
    }

    #[test]
    fn test_with_cache_db_override() {
        let config = Config::with_root("/tmp/fake-home").with_cache_db("/tmp/other.db");
        assert_eq!(config.cache_db_path, PathBuf::from("/tmp/other.db"));
    }
}
