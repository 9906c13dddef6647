//! Streaming reader for the FASTA files the adapters consume.

use std::io::BufRead;

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// First whitespace-delimited token of the header line.
    pub name: String,
    /// Full header line without the leading `>`.
    pub description: String,
    pub sequence: String,
}

impl FastaRecord {
    pub fn description_tokens(&self) -> Vec<&str> {
        self.description.split_whitespace().collect()
    }
}

/// Yields one record per `>` header. Text before the first header is ignored.
pub struct FastaReader<R> {
    reader: R,
    line: String,
    pending_header: Option<String>,
    done: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            pending_header: None,
            done: false,
        }
    }

    fn read_line(&mut self) -> Result<bool, IngestError> {
        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|err| IngestError::Fasta(err.to_string()))?;
        Ok(read > 0)
    }

    fn next_record(&mut self) -> Result<Option<FastaRecord>, IngestError> {
        let header = match self.pending_header.take() {
            Some(header) => header,
            None => loop {
                if !self.read_line()? {
                    return Ok(None);
                }
                if let Some(header) = self.line.trim_end().strip_prefix('>') {
                    break header.to_string();
                }
            },
        };

        let mut sequence = String::new();
        while self.read_line()? {
            let trimmed = self.line.trim();
            if let Some(next) = trimmed.strip_prefix('>') {
                self.pending_header = Some(next.to_string());
                break;
            }
            sequence.push_str(trimmed);
        }

        let description = header.trim().to_string();
        let name = description
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(Some(FastaRecord {
            name,
            description,
            sequence,
        }))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
