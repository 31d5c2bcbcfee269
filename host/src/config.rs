//! Session configuration from file and command line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use neuro_ipc::SessionConfig;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub executable: Option<PathBuf>,
    pub display_name: Option<String>,
    pub max_consecutive_failures: Option<u32>,
}

/// Read a JSON config file. Missing fields take their defaults.
pub fn load(path: &Path) -> Result<SessionConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Build the session config: file (if any), then overrides, then validation.
pub fn resolve(file: Option<&Path>, overrides: Overrides) -> Result<SessionConfig> {
    let mut config = match file {
        Some(path) => load(path)?,
        None => SessionConfig::default(),
    };

    if let Some(executable) = overrides.executable {
        config.executable_path = executable;
    }
    if let Some(name) = overrides.display_name {
        config.display_name = name;
    }
    if let Some(max) = overrides.max_consecutive_failures {
        config.max_consecutive_failures = max;
    }

    config.validate().context("Invalid session config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file = config_file(
            r#"{"executable_path": "/usr/bin/xterm", "max_consecutive_failures": 4, "capture_interval_ms": 50}"#,
        );

        let config = resolve(
            Some(file.path()),
            Overrides {
                executable: Some(PathBuf::from("/usr/bin/xclock")),
                max_consecutive_failures: Some(7),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.executable_path, PathBuf::from("/usr/bin/xclock"));
        assert_eq!(config.max_consecutive_failures, 7);
        assert_eq!(config.capture_interval_ms, 50);
        assert_eq!(config.label(), "xclock");
    }

    #[test]
    fn test_missing_executable_is_rejected() {
        let err = resolve(None, Overrides::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("executable_path"));
    }

    #[test]
    fn test_malformed_file_names_the_path() {
        let file = config_file("{ not json");
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
