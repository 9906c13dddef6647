use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::backfill::BackfillStats;
use crate::domain::{DatasetName, DatasetVariant, IngestSummary};
use crate::error::IngestError;
use crate::sink::JsonLinesSink;

pub const RECORDS_FILE: &str = "records.jsonl";
pub const INFO_FILE: &str = "dataset_info.json";

/// Records being written for a dataset that is not yet committed. Dropping it
/// discards the partial output.
pub type StagedSink = JsonLinesSink<BufWriter<NamedTempFile>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dataset: DatasetName,
    pub variant: DatasetVariant,
    pub version: String,
    pub sources: BTreeMap<String, String>,
    pub summary: IngestSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backfill: Option<BackfillStats>,
    pub prepared_at: String,
    pub tool: String,
}

/// Prepared datasets under `<data_dir>/<dataset>/<variant>/`.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: Utf8PathBuf,
}

impl Store {
    pub fn new(data_dir: Utf8PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn dataset_dir(&self, name: DatasetName, variant: DatasetVariant) -> Utf8PathBuf {
        self.data_dir
            .join(name.to_string())
            .join(variant.to_string())
    }

    pub fn records_path(&self, name: DatasetName, variant: DatasetVariant) -> Utf8PathBuf {
        self.dataset_dir(name, variant).join(RECORDS_FILE)
    }

    pub fn info_path(&self, name: DatasetName, variant: DatasetVariant) -> Utf8PathBuf {
        self.dataset_dir(name, variant).join(INFO_FILE)
    }

    /// A dataset counts as prepared once its info file exists; the info file is
    /// always written after the records.
    pub fn is_prepared(&self, name: DatasetName, variant: DatasetVariant) -> bool {
        self.info_path(name, variant).as_std_path().exists()
            && self.records_path(name, variant).as_std_path().exists()
    }

    pub fn read_info(
        &self,
        name: DatasetName,
        variant: DatasetVariant,
    ) -> Result<DatasetInfo, IngestError> {
        let path = self.info_path(name, variant);
        if !path.as_std_path().exists() {
            return Err(IngestError::DatasetNotFound(format!("{name}/{variant}")));
        }
        read_info_file(&path)
    }

    pub fn stage(
        &self,
        name: DatasetName,
        variant: DatasetVariant,
    ) -> Result<StagedSink, IngestError> {
        let dir = self.dataset_dir(name, variant);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("kira-ingest-records")
            .tempfile_in(dir.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        Ok(JsonLinesSink::new(BufWriter::new(temp)))
    }

    /// Moves staged records into place, then writes the info file.
    pub fn commit(&self, sink: StagedSink, info: &DatasetInfo) -> Result<Utf8PathBuf, IngestError> {
        let records_path = self.records_path(info.dataset, info.variant);
        let temp = sink
            .into_inner()?
            .into_inner()
            .map_err(|err| IngestError::Filesystem(err.error().to_string()))?;
        temp.persist(records_path.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;

        let content = serde_json::to_vec_pretty(info)
            .map_err(|err| IngestError::Serialization(err.to_string()))?;
        write_bytes_atomic(&self.info_path(info.dataset, info.variant), &content)?;
        Ok(records_path)
    }

    pub fn list(&self) -> Result<Vec<DatasetInfo>, IngestError> {
        let mut entries = Vec::new();
        for name in DatasetName::all() {
            for variant in [
                DatasetVariant::Default,
                DatasetVariant::NoSeq,
                DatasetVariant::WithSeq,
            ] {
                let path = self.info_path(name, variant);
                if path.as_std_path().is_file() {
                    entries.push(read_info_file(&path)?);
                }
            }
        }
        Ok(entries)
    }
}

fn read_info_file(path: &Utf8Path) -> Result<DatasetInfo, IngestError> {
    let file =
        File::open(path.as_std_path()).map_err(|err| IngestError::Filesystem(err.to_string()))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|err| IngestError::Serialization(format!("{path}: {err}")))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), IngestError> {
    let parent = path
        .parent()
        .ok_or_else(|| IngestError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("kira-ingest-file")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    Ok(())
}
