//! Per-dataset record extraction. Each adapter streams its input files and
//! writes keyed records into a [`RecordSink`](crate::sink::RecordSink).

pub mod hippie;
pub mod mhcflurry;
pub mod pfam;
pub mod stringdb;
pub mod uniref;

use std::io::Read;

use csv::{ReaderBuilder, StringRecord};
use tracing::{info, warn};

use crate::domain::IngestSummary;
use crate::error::IngestError;

pub(crate) fn tsv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(reader)
}

pub(crate) fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new().flexible(true).from_reader(reader)
}

pub(crate) fn column(headers: &StringRecord, name: &str) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|header| header.trim() == name)
        .ok_or_else(|| IngestError::MissingColumn(name.to_string()))
}

pub(crate) fn field(row: &StringRecord, index: usize) -> &str {
    row.get(index).map(str::trim).unwrap_or_default()
}

pub(crate) fn line_of(row: &StringRecord) -> u64 {
    row.position().map(|pos| pos.line()).unwrap_or_default()
}

pub(crate) fn log_summary(dataset: &str, summary: &IngestSummary) {
    info!(
        dataset,
        rows = summary.rows_read,
        emitted = summary.emitted,
        "records generated"
    );
    for (reason, count) in &summary.skipped {
        warn!(dataset, reason = %reason, count, "records skipped");
    }
}
