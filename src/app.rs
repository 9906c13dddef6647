use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::adapters::{hippie, mhcflurry, pfam, stringdb, uniref};
use crate::backfill::{BackfillStats, SequenceFetcher};
use crate::config::ResolvedConfig;
use crate::domain::{DatasetName, DatasetVariant, IngestSummary};
use crate::download::Downloader;
use crate::error::IngestError;
use crate::store::{DatasetInfo, StagedSink, Store};

#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    pub variant: Option<DatasetVariant>,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepareReport {
    pub dataset: DatasetName,
    pub variant: DatasetVariant,
    /// `prepared` or `reused`.
    pub action: String,
    pub records_path: String,
    pub info: DatasetInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub dataset: DatasetName,
    pub variant: DatasetVariant,
    pub records: u64,
    pub prepared_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub records_path: String,
    pub info: DatasetInfo,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<D: Downloader, F: SequenceFetcher> {
    store: Store,
    config: ResolvedConfig,
    downloader: D,
    fetcher: F,
}

impl<D: Downloader, F: SequenceFetcher> App<D, F> {
    pub fn new(store: Store, config: ResolvedConfig, downloader: D, fetcher: F) -> Self {
        Self {
            store,
            config,
            downloader,
            fetcher,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn prepare(
        &self,
        name: DatasetName,
        options: PrepareOptions,
        sink: &dyn ProgressSink,
    ) -> Result<PrepareReport, IngestError> {
        let variant = name.resolve_variant(options.variant)?;
        let records_path = self.store.records_path(name, variant);

        if !options.force && self.store.is_prepared(name, variant) {
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; reusing prepared {name}/{variant}"),
                elapsed: None,
            });
            return Ok(PrepareReport {
                dataset: name,
                variant,
                action: "reused".to_string(),
                records_path: records_path.to_string(),
                info: self.store.read_info(name, variant)?,
            });
        }

        let sources = name.sources();
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Download; {} source file(s)", sources.len()),
            elapsed: None,
        });
        let files = self.downloader.download_and_extract(&sources)?;
        sink.event(ProgressEvent {
            message: "phase=Download; done".to_string(),
            elapsed: Some(started.elapsed()),
        });

        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Generate; {name}/{variant}"),
            elapsed: None,
        });
        let mut staged = self.store.stage(name, variant)?;
        let (summary, backfill) = self.generate(name, variant, &files, &mut staged)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Generate; {} records, {} skipped",
                summary.emitted,
                summary.total_skipped()
            ),
            elapsed: Some(started.elapsed()),
        });

        let info = DatasetInfo {
            dataset: name,
            variant,
            version: name.version().to_string(),
            sources,
            summary,
            backfill,
            prepared_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            tool: format!("kira-ingest/{}", env!("CARGO_PKG_VERSION")),
        };
        let records_path = self.store.commit(staged, &info)?;
        info!(dataset = %name, variant = %variant, path = %records_path, "dataset prepared");
        sink.event(ProgressEvent {
            message: format!("phase=Done; {records_path}"),
            elapsed: None,
        });

        Ok(PrepareReport {
            dataset: name,
            variant,
            action: "prepared".to_string(),
            records_path: records_path.to_string(),
            info,
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, IngestError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; scanning {}", self.store.data_dir()),
            elapsed: None,
        });
        let datasets = self
            .store
            .list()?
            .into_iter()
            .map(|info| ListEntry {
                dataset: info.dataset,
                variant: info.variant,
                records: info.summary.emitted,
                prepared_at: info.prepared_at,
            })
            .collect();
        Ok(ListResult { datasets })
    }

    pub fn info(
        &self,
        name: DatasetName,
        variant: Option<DatasetVariant>,
        sink: &dyn ProgressSink,
    ) -> Result<InfoResult, IngestError> {
        let variant = name.resolve_variant(variant)?;
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {name}/{variant}"),
            elapsed: None,
        });
        let info = self.store.read_info(name, variant)?;
        Ok(InfoResult {
            records_path: self.store.records_path(name, variant).to_string(),
            info,
        })
    }

    fn generate(
        &self,
        name: DatasetName,
        variant: DatasetVariant,
        files: &BTreeMap<String, Utf8PathBuf>,
        staged: &mut StagedSink,
    ) -> Result<(IngestSummary, Option<BackfillStats>), IngestError> {
        match (name, variant) {
            (DatasetName::Hippie, DatasetVariant::WithSeq) => {
                let (summary, stats) = hippie::generate_with_seq(
                    open(files, "mitab_file")?,
                    staged,
                    &self.fetcher,
                    self.config.sequences.max_batch_size,
                )?;
                Ok((summary, Some(stats)))
            }
            (DatasetName::Hippie, _) => {
                Ok((hippie::generate_no_seq(open(files, "mitab_file")?, staged)?, None))
            }
            (DatasetName::MhcBindingAffinity, _) => {
                let alleles = mhcflurry::allele_sequences(open(files, "mhc_sequence_file")?)?;
                let summary = mhcflurry::generate(
                    open(files, "affinity_file")?,
                    &alleles,
                    &self.config.mhc,
                    staged,
                )?;
                Ok((summary, None))
            }
            (DatasetName::PfamRegions, _) => {
                Ok((pfam::generate(open(files, "tsv_file")?, staged)?, None))
            }
            (DatasetName::StringLinks, _) => {
                let aliases = stringdb::alias_map(
                    open(files, "alias_file")?,
                    &self.config.string.alias_source,
                )?;
                info!(aliases = aliases.len(), "alias map built");
                let summary = stringdb::generate_links(
                    open(files, "links_file")?,
                    &aliases,
                    &self.config.string,
                    staged,
                )?;
                Ok((summary, None))
            }
            (DatasetName::Uniref50, _) => {
                Ok((uniref::generate(open(files, "fasta_file")?, staged)?, None))
            }
        }
    }
}

fn open(
    files: &BTreeMap<String, Utf8PathBuf>,
    key: &str,
) -> Result<BufReader<File>, IngestError> {
    let path = files
        .get(key)
        .ok_or_else(|| IngestError::Filesystem(format!("source file {key} was not downloaded")))?;
    let file = File::open(path.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("{path}: {err}")))?;
    Ok(BufReader::new(file))
}
