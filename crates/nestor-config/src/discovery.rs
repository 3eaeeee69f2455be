//! Config file discovery

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_PATH_ENV: &str = "NESTOR_CONFIG_PATH";

/// File names tried in each search directory, in priority order
pub const CANDIDATES: [&str; 4] = ["nestor.local.yml", "nestor.yml", "nestor.yaml", ".nestor.yml"];

/// Locate the project's config file.
///
/// Search order:
/// 1. `explicit` (the `--config` flag)
/// 2. `NESTOR_CONFIG_PATH`
/// 3. current directory, see [`CANDIDATES`]
/// 4. `./.nestor/` with the same names
/// 5. `~/.config/nestor/nestor.yml`
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(ConfigError::MissingFile(path.to_path_buf()))
        };
    }

    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        debug!(path = %path.display(), "Checking {CONFIG_PATH_ENV}");
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_in(&current_dir) {
        return Ok(path);
    }

    let nestor_dir = current_dir.join(".nestor");
    if nestor_dir.is_dir() {
        if let Some(path) = find_in(&nestor_dir) {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("nestor").join("nestor.yml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::NotFound)
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    struct CurrentDir(PathBuf);

    impl CurrentDir {
        fn enter(path: &Path) -> Self {
            let original = std::env::current_dir().unwrap();
            std::env::set_current_dir(path).unwrap();
            Self(original)
        }
    }

    impl Drop for CurrentDir {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.0);
        }
    }

    #[test]
    #[serial]
    fn test_find_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("nestor.yml"), "nestor: \"1\"").unwrap();
        let _cwd = CurrentDir::enter(temp_dir.path());

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let found = find_config_file(None).unwrap();
            assert!(found.ends_with("nestor.yml"));
        });
    }

    #[test]
    #[serial]
    fn test_local_file_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("nestor.yml"), "").unwrap();
        fs::write(temp_dir.path().join("nestor.local.yml"), "").unwrap();
        let _cwd = CurrentDir::enter(temp_dir.path());

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            assert!(find_config_file(None).unwrap().ends_with("nestor.local.yml"));
        });
    }

    #[test]
    #[serial]
    fn test_find_in_nestor_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nestor_dir = temp_dir.path().join(".nestor");
        fs::create_dir(&nestor_dir).unwrap();
        fs::write(nestor_dir.join("nestor.yaml"), "").unwrap();
        let _cwd = CurrentDir::enter(temp_dir.path());

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            assert!(find_config_file(None).unwrap().ends_with(".nestor/nestor.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.yml");
        fs::write(&custom, "").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(custom.as_os_str()), || {
            assert_eq!(find_config_file(None).unwrap(), custom);
        });
    }

    #[test]
    #[serial]
    fn test_explicit_path_takes_precedence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let from_env = temp_dir.path().join("env.yml");
        let from_flag = temp_dir.path().join("flag.yml");
        fs::write(&from_env, "").unwrap();
        fs::write(&from_flag, "").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(from_env.as_os_str()), || {
            assert_eq!(find_config_file(Some(&from_flag)).unwrap(), from_flag);
        });
    }

    #[test]
    fn test_explicit_missing_file() {
        let result = find_config_file(Some(Path::new("/nonexistent/nestor.yml")));
        assert!(matches!(result, Err(ConfigError::MissingFile(_))));
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let _cwd = CurrentDir::enter(temp_dir.path());

        temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, None::<&str>),
                ("XDG_CONFIG_HOME", Some(temp_dir.path().to_str().unwrap())),
                ("HOME", Some(temp_dir.path().to_str().unwrap())),
            ],
            || {
                assert!(matches!(find_config_file(None), Err(ConfigError::NotFound)));
            },
        );
    }
}
