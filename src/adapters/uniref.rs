//! UniRef cluster representatives. Header lines carry the cluster metadata:
//! `UniRef50_Q8WZ42 Titin n=1336 Tax=Vertebrata TaxID=7742 RepID=TITIN_HUMAN`.

use std::io::BufRead;

use crate::adapters::log_summary;
use crate::domain::{IngestSummary, RecordKey, SkipReason, UniRefClusterRecord};
use crate::error::IngestError;
use crate::fasta::{FastaReader, FastaRecord};
use crate::sink::RecordSink;

fn cluster_name(tokens: &[&str]) -> String {
    tokens
        .iter()
        .skip(1)
        .take_while(|token| !token.starts_with("n="))
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_by_prefix<'a>(tokens: &[&'a str], prefix: &str) -> Option<&'a str> {
    tokens.iter().find_map(|&token| token.strip_prefix(prefix))
}

fn tax_name(tokens: &[&str]) -> String {
    let mut words = Vec::new();
    let mut in_name = false;
    for &token in tokens {
        if let Some(first) = token.strip_prefix("Tax=") {
            in_name = true;
            words.push(first);
        } else if in_name {
            if token.contains('=') {
                break;
            }
            words.push(token);
        }
    }
    words.join(" ")
}

/// `None` when the member count is missing or not an integer.
pub fn extract(record: &FastaRecord) -> Option<UniRefClusterRecord> {
    let tokens = record.description_tokens();
    let num_members = word_by_prefix(&tokens, "n=")?.parse::<i32>().ok()?;
    Some(UniRefClusterRecord {
        unique_identifier: record.name.clone(),
        cluster_name: cluster_name(&tokens),
        num_members,
        tax_name: tax_name(&tokens),
        tax_id: word_by_prefix(&tokens, "TaxID=")
            .unwrap_or_default()
            .to_string(),
        representative_member: word_by_prefix(&tokens, "RepID=")
            .unwrap_or_default()
            .to_string(),
        aa_sequence: record.sequence.clone(),
    })
}

pub fn generate<R: BufRead, S: RecordSink>(
    reader: R,
    sink: &mut S,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();
    for record in FastaReader::new(reader) {
        let record = record?;
        summary.rows_read += 1;
        let Some(cluster) = extract(&record) else {
            summary.skip(SkipReason::MalformedField);
            continue;
        };
        sink.write(RecordKey::Id(cluster.unique_identifier.clone()), &cluster)?;
        summary.emitted += 1;
    }
    log_summary("uniref50", &summary);
    Ok(summary)
}
