use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

fn empty_path_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(opt.and_then(|path| {
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub analysis: AnalysisConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&raw).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Markdown report path; None writes no report file.
    #[serde(deserialize_with = "empty_path_none")]
    pub report: Option<PathBuf>,
    #[serde(deserialize_with = "empty_path_none")]
    pub export_json: Option<PathBuf>,
    #[serde(deserialize_with = "empty_path_none")]
    pub export_csv: Option<PathBuf>,
    /// Suppress the stdout summary.
    pub quiet: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            report: None,
            export_json: None,
            export_csv: None,
            quiet: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Include RTT estimation in the report.
    pub rtt: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig { rtt: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.output.report.is_none());
        assert!(!config.output.quiet);
        assert!(config.analysis.rtt);
    }

    #[test]
    fn empty_path_becomes_none() {
        let config: Config = toml::from_str(
            r#"
            [output]
            report = ""
            export_csv = "flows.csv"
            "#,
        )
        .unwrap();
        assert!(config.output.report.is_none());
        assert_eq!(
            config.output.export_csv.as_deref(),
            Some(Path::new("flows.csv"))
        );
    }

    #[test]
    fn analysis_toggle_parses() {
        let config: Config = toml::from_str("[analysis]\nrtt = false\n").unwrap();
        assert!(!config.analysis.rtt);
    }
}
