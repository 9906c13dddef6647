//! HIPPIE protein-protein interactions (MITAB).
//!
//! The `no-seq` variant emits identifiers and confidence only. The `with-seq`
//! variant runs rows through [`SequenceBackfill`] so every emitted record
//! carries both amino-acid sequences.

use std::io::Read;

use csv::StringRecord;

use crate::adapters::{column, field, line_of, log_summary, tsv_reader};
use crate::backfill::{BackfillStats, SequenceBackfill, SequenceFetcher};
use crate::domain::{InteractionRecord, IngestSummary, RecordKey, SkipReason};
use crate::error::IngestError;
use crate::sink::RecordSink;

pub const ACCESSION_NAMESPACE: &str = "uniprotkb";
pub const ALT_ID_A_COLUMN: &str = "Alt IDs Interactor A";
pub const ALT_ID_B_COLUMN: &str = "Alt IDs Interactor B";
pub const CONFIDENCE_COLUMN: &str = "Confidence Value";

/// Accession from a `"<namespace>:<accession>"` field, if the namespace matches
/// and the field has exactly two parts.
pub fn parse_accession(value: &str, namespace: &str) -> Option<String> {
    let parts = value.trim().split(':').collect::<Vec<_>>();
    match parts.as_slice() {
        [ns, accession] if *ns == namespace && !accession.is_empty() => {
            Some(accession.to_string())
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MitabColumns {
    alt_id_a: usize,
    alt_id_b: usize,
    confidence: usize,
}

impl MitabColumns {
    pub fn from_headers(headers: &StringRecord) -> Result<Self, IngestError> {
        Ok(Self {
            alt_id_a: column(headers, ALT_ID_A_COLUMN)?,
            alt_id_b: column(headers, ALT_ID_B_COLUMN)?,
            confidence: column(headers, CONFIDENCE_COLUMN)?,
        })
    }
}

/// `Ok(None)` when either identifier is absent. A non-numeric confidence is an
/// error: coercing scores would silently corrupt the dataset.
pub fn extract(
    row: &StringRecord,
    columns: &MitabColumns,
) -> Result<Option<InteractionRecord>, IngestError> {
    let raw_confidence = field(row, columns.confidence);
    let confidence = raw_confidence
        .parse::<f32>()
        .map_err(|_| IngestError::MalformedField {
            field: CONFIDENCE_COLUMN.to_string(),
            value: raw_confidence.to_string(),
            line: line_of(row),
        })?;

    let a = parse_accession(field(row, columns.alt_id_a), ACCESSION_NAMESPACE);
    let b = parse_accession(field(row, columns.alt_id_b), ACCESSION_NAMESPACE);
    Ok(match (a, b) {
        (Some(protein_a_id), Some(protein_b_id)) => Some(InteractionRecord {
            protein_a_id,
            protein_b_id,
            confidence,
        }),
        _ => None,
    })
}

/// Indexed rows of a MITAB file; `None` marks a row without usable identifiers.
pub fn interactions<R: Read>(
    reader: R,
) -> Result<impl Iterator<Item = Result<(usize, Option<InteractionRecord>), IngestError>>, IngestError>
{
    let mut reader = tsv_reader(reader);
    let columns = MitabColumns::from_headers(reader.headers()?)?;
    Ok(reader
        .into_records()
        .enumerate()
        .map(move |(index, row)| {
            let row = row?;
            Ok((index, extract(&row, &columns)?))
        }))
}

pub fn generate_no_seq<R: Read, S: RecordSink>(
    reader: R,
    sink: &mut S,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();
    for row in interactions(reader)? {
        let (index, record) = row?;
        summary.rows_read += 1;
        match record {
            Some(record) => {
                sink.write(RecordKey::Index(index), &record)?;
                summary.emitted += 1;
            }
            None => summary.skip(SkipReason::MissingIdentifier),
        }
    }
    log_summary("hippie/no-seq", &summary);
    Ok(summary)
}

pub fn generate_with_seq<R, S, F>(
    reader: R,
    sink: &mut S,
    fetcher: &F,
    max_batch_size: usize,
) -> Result<(IngestSummary, BackfillStats), IngestError>
where
    R: Read,
    S: RecordSink,
    F: SequenceFetcher + ?Sized,
{
    let mut rows_read = 0u64;
    let mut missing_identifier = 0u64;
    let accepted = interactions(reader)?.filter_map(|row| {
        rows_read += 1;
        match row {
            Ok((index, Some(record))) => Some(Ok((index, record))),
            Ok((_, None)) => {
                missing_identifier += 1;
                None
            }
            Err(err) => Some(Err(err)),
        }
    });

    let mut stream = SequenceBackfill::new(fetcher, max_batch_size)?.stream(accepted);
    let mut emitted = 0u64;
    for item in stream.by_ref() {
        let (index, record) = item?;
        sink.write(RecordKey::Index(index), &record)?;
        emitted += 1;
    }
    let stats = stream.into_stats();

    let mut summary = IngestSummary {
        rows_read,
        emitted,
        ..IngestSummary::default()
    };
    summary.skip_many(SkipReason::MissingIdentifier, missing_identifier);
    summary.skip_many(SkipReason::UnresolvedAccession, stats.dropped_unresolved);
    log_summary("hippie/with-seq", &summary);
    Ok((summary, stats))
}
