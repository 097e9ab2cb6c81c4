use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::dialect::MarkerSet;
use crate::iotrace::SignalSpec;

/// Highest pin number addressable on the device's GPIO ports.
const MAX_PIN: u32 = 31;

/// Top-level configuration for the analyzer.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Firmware log dialect selecting the marker table. Default: "pscm".
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Named digital signals available to the IO trace replay.
    #[serde(default)]
    pub signals: Vec<SignalSpec>,

    /// External plot script configuration.
    #[serde(default)]
    pub plot: PlotConfig,
}

/// External plot script configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotConfig {
    /// Invoke the plot script after writing the dataset. Default: false.
    #[serde(default)]
    pub enabled: bool,

    /// Path of the plot script. Default: "stat.R".
    #[serde(default = "default_plot_script")]
    pub script: PathBuf,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_dialect() -> String {
    "pscm".to_string()
}

fn default_plot_script() -> PathBuf {
    PathBuf::from("stat.R")
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dialect: default_dialect(),
            signals: Vec::new(),
            plot: PlotConfig::default(),
        }
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            script: default_plot_script(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if MarkerSet::by_name(&self.dialect).is_none() {
            bail!("unknown dialect: {}", self.dialect);
        }

        let mut names = HashSet::new();
        let mut pins = HashSet::new();
        for signal in &self.signals {
            if signal.name.is_empty() {
                bail!("signal name must not be empty");
            }
            if !names.insert(signal.name.as_str()) {
                bail!("duplicate signal name: {}", signal.name);
            }
            if !pins.insert((signal.port, signal.pin)) {
                bail!("signals share port {} pin {}", signal.port, signal.pin);
            }
            if signal.pin > MAX_PIN {
                bail!("signal {}: pin {} exceeds {MAX_PIN}", signal.name, signal.pin);
            }
        }

        Ok(())
    }

    /// The marker table selected by this configuration.
    pub fn markers(&self) -> Result<MarkerSet> {
        MarkerSet::by_name(&self.dialect)
            .with_context(|| format!("unknown dialect: {}", self.dialect))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dialect, "pscm");
        assert!(!cfg.plot.enabled);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
log_level: debug
dialect: pscm
signals:
  - { name: relay, port: 2, pin: 11 }
  - { name: modem_power, port: 0, pin: 4 }
plot:
  enabled: true
  script: tools/stat.R
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.signals.len(), 2);
        assert_eq!(cfg.signals[0].name, "relay");
        assert!(cfg.plot.enabled);
        assert_eq!(cfg.plot.script, PathBuf::from("tools/stat.R"));
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let cfg = Config {
            dialect: "klingon".to_string(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_duplicate_signal_name_rejected() {
        let yaml = r#"
signals:
  - { name: relay, port: 2, pin: 11 }
  - { name: relay, port: 0, pin: 4 }
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_duplicate_pin_binding_rejected() {
        let yaml = r#"
signals:
  - { name: relay, port: 2, pin: 11 }
  - { name: other, port: 2, pin: 11 }
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_out_of_range_pin_rejected() {
        let yaml = r#"
signals:
  - { name: relay, port: 2, pin: 32 }
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validate().is_err());
    }
}
