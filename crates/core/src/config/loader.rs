//! Configuration file loading

use super::schema::ConfigSchema;
use crate::error::{Error, ErrorCode, Result};
use std::path::{Path, PathBuf};

/// Configuration wrapper
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub schema: ConfigSchema,
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path or the standard locations
    ///
    /// An explicit path must exist; the standard locations are optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                let p = expand_path(&p.to_string_lossy());
                if !p.exists() {
                    return Err(Error::config_not_found(&p));
                }
                Some(p)
            }
            None => find_config_file(),
        };

        let schema = if let Some(ref p) = config_path {
            load_config_file(p)?
        } else {
            ConfigSchema::default()
        };

        Ok(Self {
            schema,
            path: config_path,
        })
    }
}

/// Find configuration file in standard locations
fn find_config_file() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from(".kiwix-tools.toml"),
        PathBuf::from("kiwix-tools.toml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("kiwix-tools").join("config.toml"));
    }

    candidates.into_iter().find(|c| c.exists())
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &Path) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read config file {}: {}", path.display(), e))
            .with_source(e)
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::new(
            ErrorCode::ConfigParseError,
            format!("Failed to parse config file {}: {}", path.display(), e),
        )
        .with_source(e)
    })
}

/// Expand `~` and `$VAR` in a path taken from config or environment
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.path.is_none());
        assert_eq!(config.schema.native.compiler_version, "4.8");
        assert_eq!(config.schema.native.archs, vec!["armeabi", "mips", "x86"]);
        assert_eq!(config.schema.publish.default_track, "alpha");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/kiwix-tools.toml"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigNotFound);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiwix-tools.toml");
        std::fs::write(
            &path,
            "[native]\nplatform = \"android-21\"\n\n[poll]\nmax_attempts = 5\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.schema.native.platform, "android-21");
        assert_eq!(config.schema.native.compiler_version, "4.8");
        assert_eq!(config.schema.poll.max_attempts, 5);
        assert_eq!(config.schema.poll.interval_secs, 10);
        assert_eq!(config.schema.custom.template_package, "org.kiwix.kiwixmobile");
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[native\nplatform=").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigParseError);
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(expand_path("/opt/ndk"), PathBuf::from("/opt/ndk"));
    }
}
