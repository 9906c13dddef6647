use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::backfill::{FetchOutcome, SequenceFetcher};
use crate::config::SequenceServiceConfig;
use crate::error::IngestError;
use crate::fasta::FastaReader;
use crate::retry::{AttemptError, RetryPolicy, is_retryable_error, is_retryable_status};

pub const DEFAULT_UNIPROT_ENDPOINT: &str = "https://www.uniprot.org/uploadlists/";

/// Batch sequence lookup against the UniProt ID-mapping form endpoint.
#[derive(Clone)]
pub struct UniprotSequenceClient {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl UniprotSequenceClient {
    pub fn new(config: &SequenceServiceConfig) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::UniprotHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| IngestError::UniprotHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            retry: config.retry_policy(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_fasta(&self, accessions: &BTreeSet<String>) -> Result<String, IngestError> {
        let query = accessions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        let form = [
            ("from", "ACC+ID"),
            ("to", "ACC"),
            ("format", "fasta"),
            ("query", query.as_str()),
        ];

        self.retry.run("uniprot sequence lookup", |attempt| {
            debug!(attempt, accessions = accessions.len(), "posting sequence lookup");
            let response = self
                .client
                .post(&self.endpoint)
                .form(&form)
                .send()
                .map_err(|err| {
                    let retryable = is_retryable_error(&err);
                    let err = IngestError::UniprotHttp(err.to_string());
                    if retryable {
                        AttemptError::Transient(err)
                    } else {
                        AttemptError::Permanent(err)
                    }
                })?;

            let status = response.status().as_u16();
            if !response.status().is_success() {
                let message = response
                    .text()
                    .unwrap_or_else(|_| "UniProt request failed".to_string());
                let err = IngestError::UniprotStatus { status, message };
                return Err(if is_retryable_status(status) {
                    AttemptError::Transient(err)
                } else {
                    AttemptError::Permanent(err)
                });
            }

            // A body cut off mid-transfer is as transient as a dropped connection.
            response
                .text()
                .map_err(|err| AttemptError::Transient(IngestError::UniprotHttp(err.to_string())))
        })
    }
}

impl SequenceFetcher for UniprotSequenceClient {
    fn fetch(&self, accessions: &BTreeSet<String>) -> Result<FetchOutcome, IngestError> {
        if accessions.is_empty() {
            return Ok(FetchOutcome::default());
        }
        let body = self.request_fasta(accessions)?;
        parse_sequence_response(&body, accessions)
    }
}

/// Splits a FASTA response into resolved sequences and the requested
/// identifiers that did not come back.
///
/// Each record is keyed by the last `|`-separated segment of its header name.
/// UniProtKB headers (`sp|P69905|HBA_HUMAN`) end in the entry name, so the
/// sequence is also filed under any other segment that was requested.
pub fn parse_sequence_response(
    body: &str,
    requested: &BTreeSet<String>,
) -> Result<FetchOutcome, IngestError> {
    let mut outcome = FetchOutcome::default();
    for record in FastaReader::new(body.as_bytes()) {
        let record = record?;
        if record.sequence.is_empty() {
            continue;
        }
        let mut segments = record.name.split('|').filter(|s| !s.is_empty());
        let Some(last) = segments.next_back() else {
            continue;
        };
        for segment in segments.filter(|s| requested.contains(*s)) {
            outcome
                .sequences
                .insert(segment.to_string(), record.sequence.clone());
        }
        outcome.sequences.insert(last.to_string(), record.sequence);
    }
    outcome.missing = requested
        .iter()
        .filter(|acc| !outcome.sequences.contains_key(acc.as_str()))
        .cloned()
        .collect();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn uniprotkb_header_keyed_by_entry_name() {
        let body = ">sp|P69905|HBA_HUMAN Hemoglobin subunit alpha\nMVLSPADK\n";
        let outcome = parse_sequence_response(body, &requested(&["HBA_HUMAN"])).unwrap();
        assert_eq!(outcome.sequences.get("HBA_HUMAN").map(String::as_str), Some("MVLSPADK"));
        assert!(!outcome.sequences.contains_key("P69905"));
        assert!(!outcome.sequences.contains_key("sp"));
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn requested_accession_segment_also_resolves() {
        let body = ">sp|P69905|HBA_HUMAN Hemoglobin subunit alpha\nMVLSPADK\n";
        let outcome =
            parse_sequence_response(body, &requested(&["P69905", "HBA_HUMAN"])).unwrap();
        assert_eq!(outcome.sequences["P69905"], "MVLSPADK");
        assert_eq!(outcome.sequences["HBA_HUMAN"], "MVLSPADK");
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn last_pipe_segment_is_the_accession() {
        let body = ">ref|NP_000549|P69905 Hemoglobin\nMVLS\nPADK\n";
        let outcome = parse_sequence_response(body, &requested(&["P69905"])).unwrap();
        assert_eq!(outcome.sequences.get("P69905").map(String::as_str), Some("MVLSPADK"));
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn unanswered_accessions_are_missing() {
        let body = ">P01308\nMALWMR\n";
        let outcome =
            parse_sequence_response(body, &requested(&["P01308", "Q00000"])).unwrap();
        assert_eq!(outcome.missing, requested(&["Q00000"]));
    }

    #[test]
    fn empty_body_marks_everything_missing() {
        let outcome = parse_sequence_response("", &requested(&["A", "B"])).unwrap();
        assert!(outcome.sequences.is_empty());
        assert_eq!(outcome.missing.len(), 2);
    }
}
