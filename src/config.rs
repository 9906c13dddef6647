use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::backfill::DEFAULT_MAX_BATCH_SIZE;
use crate::error::IngestError;
use crate::retry::RetryPolicy;
use crate::uniprot::DEFAULT_UNIPROT_ENDPOINT;

pub const DEFAULT_CONFIG_FILE: &str = "kira-ingest.json";
pub const DEFAULT_ALIAS_SOURCE: &str = "Ensembl_UniProt";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default)]
    pub sequences: Option<SequenceEntry>,
    #[serde(default)]
    pub mhc: Option<MhcEntry>,
    #[serde(default)]
    pub string: Option<StringEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SequenceEntry {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub max_batch_size: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MhcEntry {
    #[serde(default)]
    pub normalize_measurement: Option<bool>,
    #[serde(default)]
    pub include_inequalities: Option<bool>,
    #[serde(default)]
    pub species: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StringEntry {
    #[serde(default)]
    pub alias_source: Option<String>,
    #[serde(default)]
    pub taxa: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceServiceConfig {
    pub endpoint: String,
    pub max_batch_size: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SequenceServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_UNIPROT_ENDPOINT.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_attempts: 10,
            base_delay_ms: 1000,
            timeout_secs: 300,
        }
    }
}

impl SequenceServiceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MhcOptions {
    pub normalize_measurement: bool,
    pub include_inequalities: bool,
    /// Allele species prefixes to keep (`HLA`, `H2`, ...); `None` keeps all.
    pub species: Option<Vec<String>>,
}

impl Default for MhcOptions {
    fn default() -> Self {
        Self {
            normalize_measurement: true,
            include_inequalities: false,
            species: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringOptions {
    pub alias_source: String,
    /// NCBI taxon ids to keep; `None` keeps all.
    pub taxa: Option<Vec<String>>,
}

impl Default for StringOptions {
    fn default() -> Self {
        Self {
            alias_source: DEFAULT_ALIAS_SOURCE.to_string(),
            taxa: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Utf8PathBuf,
    pub download_dir: Utf8PathBuf,
    pub sequences: SequenceServiceConfig,
    pub mhc: MhcOptions,
    pub string: StringOptions,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `kira-ingest.json` from the working directory when it
    /// exists. Without either, every setting takes its default.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(IngestError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let data_dir = match config.data_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_data_dir()?,
        };
        let download_dir = match config.download_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_download_dir()?,
        };

        let defaults = SequenceServiceConfig::default();
        let entry = config.sequences.unwrap_or_default();
        let sequences = SequenceServiceConfig {
            endpoint: entry.endpoint.unwrap_or(defaults.endpoint),
            max_batch_size: entry.max_batch_size.unwrap_or(defaults.max_batch_size),
            max_attempts: entry.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay_ms: entry.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            timeout_secs: entry.timeout_secs.unwrap_or(defaults.timeout_secs),
        };
        validate_sequences(&sequences)?;

        let mhc_entry = config.mhc.unwrap_or_default();
        let mhc_defaults = MhcOptions::default();
        let mhc = MhcOptions {
            normalize_measurement: mhc_entry
                .normalize_measurement
                .unwrap_or(mhc_defaults.normalize_measurement),
            include_inequalities: mhc_entry
                .include_inequalities
                .unwrap_or(mhc_defaults.include_inequalities),
            species: non_empty_list("mhc.species", mhc_entry.species)?,
        };

        let string_entry = config.string.unwrap_or_default();
        let alias_source = string_entry
            .alias_source
            .unwrap_or_else(|| DEFAULT_ALIAS_SOURCE.to_string());
        if alias_source.trim().is_empty() {
            return Err(IngestError::InvalidConfig(
                "string.alias_source must not be empty".to_string(),
            ));
        }
        let string = StringOptions {
            alias_source,
            taxa: non_empty_list("string.taxa", string_entry.taxa)?,
        };

        Ok(ResolvedConfig {
            schema_version,
            data_dir,
            download_dir,
            sequences,
            mhc,
            string,
        })
    }
}

fn validate_sequences(config: &SequenceServiceConfig) -> Result<(), IngestError> {
    if config.max_batch_size == 0 {
        return Err(IngestError::InvalidConfig(
            "sequences.max_batch_size must be at least 1".to_string(),
        ));
    }
    if config.max_attempts == 0 {
        return Err(IngestError::InvalidConfig(
            "sequences.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.timeout_secs == 0 {
        return Err(IngestError::InvalidConfig(
            "sequences.timeout_secs must be at least 1".to_string(),
        ));
    }
    if config.endpoint.trim().is_empty() {
        return Err(IngestError::InvalidConfig(
            "sequences.endpoint must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn non_empty_list(
    field: &str,
    values: Option<Vec<String>>,
) -> Result<Option<Vec<String>>, IngestError> {
    match values {
        None => Ok(None),
        Some(values) if values.is_empty() || values.iter().any(|v| v.trim().is_empty()) => Err(
            IngestError::InvalidConfig(format!("{field} must list non-empty values")),
        ),
        Some(values) => Ok(Some(values.into_iter().map(|v| v.trim().to_string()).collect())),
    }
}

pub fn default_data_dir() -> Result<Utf8PathBuf, IngestError> {
    let cwd = std::env::current_dir().map_err(|err| IngestError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd.join(".kira-ingest"))
        .map_err(|_| IngestError::Filesystem("invalid data directory path".to_string()))
}

pub fn default_download_dir() -> Result<Utf8PathBuf, IngestError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(
                dirs.home_dir()
                    .join(".cache")
                    .join("kira-ingest")
                    .join("downloads"),
            )
            .ok()
        })
        .ok_or_else(|| IngestError::Filesystem("unable to resolve cache directory".to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn with_dirs() -> Config {
        Config {
            data_dir: Some("/tmp/kira/data".to_string()),
            download_dir: Some("/tmp/kira/downloads".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_apply() {
        let resolved = ConfigLoader::resolve_config(with_dirs()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.sequences.max_batch_size, 40_000);
        assert_eq!(resolved.sequences.max_attempts, 10);
        assert!(resolved.mhc.normalize_measurement);
        assert!(!resolved.mhc.include_inequalities);
        assert_eq!(resolved.string.alias_source, "Ensembl_UniProt");
    }

    #[test]
    fn zero_batch_size_rejected() {
        let config = Config {
            sequences: Some(SequenceEntry {
                max_batch_size: Some(0),
                ..SequenceEntry::default()
            }),
            ..with_dirs()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, IngestError::InvalidConfig(_));
    }

    #[test]
    fn empty_allow_list_rejected() {
        let config = Config {
            string: Some(StringEntry {
                alias_source: None,
                taxa: Some(Vec::new()),
            }),
            ..with_dirs()
        };
        assert!(ConfigLoader::resolve_config(config).is_err());
    }
}
