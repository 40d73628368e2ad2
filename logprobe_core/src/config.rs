use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accessor::{CallPolicy, FrameworkKind, DEFAULT_MAX_HIERARCHY_DEPTH};
use crate::adapters::DEFAULT_ADAPTER_ORDER;
use crate::error::{ProbeError, Result};

/// File name searched for by [`ProbeConfig::from_project_root`].
pub const CONFIG_FILE_NAME: &str = "LogProbe.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deadline for one foreign call in milliseconds; 0 calls inline.
    pub call_timeout_ms: u64,
    pub max_hierarchy_depth: usize,
    /// Adapters tried in this order; the first that applies wins.
    pub adapter_order: Vec<FrameworkKind>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 5000,
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
            adapter_order: DEFAULT_ADAPTER_ORDER.to_vec(),
        }
    }
}

/// Paths used when no framework reports a file, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConventionConfig {
    pub default_log: PathBuf,
    pub console_log: PathBuf,
    pub access_log: PathBuf,
}

impl Default for ConventionConfig {
    fn default() -> Self {
        Self {
            default_log: PathBuf::from("logs/catalina.out"),
            console_log: PathBuf::from("logs/catalina.out"),
            access_log: PathBuf::from("logs/localhost_access_log.txt"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub resolver: ResolverConfig,
    pub conventions: ConventionConfig,
}

impl ProbeConfig {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .map_err(|e| ProbeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ProbeError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Find `LogProbe.toml` in the current directory or a parent; defaults if none.
    pub fn from_project_root() -> Result<Self> {
        let mut current_dir = std::env::current_dir().map_err(|e| {
            ProbeError::Config(format!("Failed to get current directory: {}", e))
        })?;

        loop {
            let config_path = current_dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                debug!("Using {}", config_path.display());
                return Self::load(config_path);
            }

            if !current_dir.pop() {
                break;
            }
        }

        debug!("No {} found, using defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolver.max_hierarchy_depth == 0 {
            return Err(ProbeError::Config(
                "max_hierarchy_depth must be at least 1".to_string(),
            ));
        }
        if self.resolver.adapter_order.is_empty() {
            return Err(ProbeError::Config(
                "adapter_order must name at least one framework".to_string(),
            ));
        }
        Ok(())
    }

    /// Limits for every foreign call made on behalf of this configuration.
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: match self.resolver.call_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            max_hierarchy_depth: self.resolver.max_hierarchy_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let config_content = r#"
[resolver]
call_timeout_ms = 250
adapter_order = ["jdk", "log4j"]

[conventions]
access_log = "logs/access.log"
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = ProbeConfig::load(config_path).unwrap();
        assert_eq!(
            config.resolver.adapter_order,
            vec![FrameworkKind::Jdk, FrameworkKind::Log4j]
        );
        assert_eq!(config.resolver.max_hierarchy_depth, 64);
        assert_eq!(config.conventions.access_log, PathBuf::from("logs/access.log"));
        assert_eq!(config.conventions.default_log, PathBuf::from("logs/catalina.out"));
        assert_eq!(
            config.call_policy().timeout,
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_zero_timeout_calls_inline() {
        let mut config = ProbeConfig::default();
        config.resolver.call_timeout_ms = 0;
        assert_eq!(config.call_policy(), CallPolicy::inline());
    }

    #[test]
    fn test_invalid_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        fs::write(&config_path, "[resolver]\nadapter_order = [\"log5j\"]\n").unwrap();
        assert!(matches!(
            ProbeConfig::load(&config_path),
            Err(ProbeError::Config(_))
        ));

        fs::write(&config_path, "[resolver]\nmax_hierarchy_depth = 0\n").unwrap();
        assert!(ProbeConfig::load(&config_path).is_err());
    }

    #[test]
    fn test_default_order() {
        let config = ProbeConfig::default();
        assert_eq!(config.resolver.adapter_order[0], FrameworkKind::Log4j);
        assert_eq!(config.resolver.adapter_order.len(), 4);
    }
}
