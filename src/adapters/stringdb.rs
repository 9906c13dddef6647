//! STRING functional links, with STRING protein ids translated to UniProt
//! accessions through the STRING alias table.

use std::collections::HashMap;
use std::io::BufRead;

use crate::adapters::log_summary;
use crate::config::StringOptions;
use crate::domain::{IngestSummary, RecordKey, SkipReason, StringLinkRecord};
use crate::error::IngestError;
use crate::sink::RecordSink;

/// NCBI taxon of a STRING protein id (`9606.ENSP00000000233` → `9606`).
pub fn taxon_of(string_id: &str) -> &str {
    string_id.split('.').next().unwrap_or(string_id)
}

/// STRING id → UniProt accession, from alias rows whose source list names
/// `alias_source`. Later rows win for repeated ids.
pub fn alias_map<R: BufRead>(
    reader: R,
    alias_source: &str,
) -> Result<HashMap<String, String>, IngestError> {
    let mut aliases = HashMap::new();
    for line in reader.lines().skip(1) {
        let line = line.map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let columns = line.split('\t').collect::<Vec<_>>();
        let [string_id, alias, .., sources] = columns.as_slice() else {
            continue;
        };
        if sources.split_whitespace().any(|source| source == alias_source) {
            aliases.insert(string_id.trim().to_string(), alias.trim().to_string());
        }
    }
    Ok(aliases)
}

pub fn generate_links<R: BufRead, S: RecordSink>(
    reader: R,
    aliases: &HashMap<String, String>,
    options: &StringOptions,
    sink: &mut S,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();
    for (index, line) in reader.lines().skip(1).enumerate() {
        let line = line.map_err(|err| IngestError::Filesystem(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        summary.rows_read += 1;

        let columns = line.split_whitespace().collect::<Vec<_>>();
        let [protein_1, protein_2, .., raw_score] = columns.as_slice() else {
            summary.skip(SkipReason::MalformedField);
            continue;
        };
        if let Some(taxa) = &options.taxa
            && !taxa.iter().any(|taxon| taxon == taxon_of(protein_1))
        {
            summary.skip(SkipReason::FilteredOut);
            continue;
        }
        let (Some(acc_1), Some(acc_2)) = (aliases.get(*protein_1), aliases.get(*protein_2)) else {
            summary.skip(SkipReason::MissingIdentifier);
            continue;
        };
        let Ok(score) = raw_score.parse::<f32>() else {
            summary.skip(SkipReason::MalformedField);
            continue;
        };

        let record = StringLinkRecord {
            uniprot_acc_1: acc_1.clone(),
            uniprot_acc_2: acc_2.clone(),
            score: score / 1000.0,
        };
        sink.write(RecordKey::Index(index), &record)?;
        summary.emitted += 1;
    }
    log_summary("string-links", &summary);
    Ok(summary)
}
