use crate::feeder::FeederConfiguration;
use crate::fetcher::IP_FETCHER;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ExportSettings {
    /// Report path; standard output when absent.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub append: bool,
    #[serde(default = "default_fetchers")]
    pub fetchers: Vec<String>,
    /// Project website named in the report's provenance comments.
    #[serde(default)]
    pub website: Option<String>,
}

pub fn default_fetchers() -> Vec<String> {
    vec![IP_FETCHER.to_string()]
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output: None,
            append: false,
            fetchers: default_fetchers(),
            website: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ScanpipeConfig {
    #[serde(default)]
    pub feeder: FeederConfiguration,
    /// Fixed generator seed for reproducible address sequences.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub export: ExportSettings,
}

impl ScanpipeConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: ScanpipeConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Ipv4Addr;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn full_config_is_loaded() {
        let file = write_config(
            r#"
seed = 7

[feeder]
prototype = "192.168.1.10"
mask = "255.255.."
count = 250

[export]
output = "report.xml"
fetchers = ["fetcher.ip", "fetcher.hostname"]
website = "https://scanpipe.example"
"#,
        );
        let config = ScanpipeConfig::load_from_file(&file.path().to_path_buf()).unwrap();

        assert_eq!(config.seed, Some(7));
        assert_eq!(config.feeder.prototype, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(config.feeder.mask, "255.255..");
        assert_eq!(config.feeder.count, 250);
        assert_eq!(config.export.output, Some(PathBuf::from("report.xml")));
        assert!(!config.export.append);
        assert_eq!(config.export.fetchers, vec!["fetcher.ip", "fetcher.hostname"]);
        assert_eq!(config.export.website.as_deref(), Some("https://scanpipe.example"));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let file = write_config("[feeder]\ncount = 5\n");
        let config = ScanpipeConfig::load_from_file(&file.path().to_path_buf()).unwrap();

        assert_eq!(config.feeder.count, 5);
        assert_eq!(config.feeder.mask, FeederConfiguration::default().mask);
        assert_eq!(config.seed, None);
        assert_eq!(config.export, ExportSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("[feeder]\nprototyp = \"10.0.0.1\"\n");
        let err = ScanpipeConfig::load_from_file(&file.path().to_path_buf()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScanpipeConfig::load_from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
