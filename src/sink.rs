use std::collections::HashSet;
use std::io::Write;

use fixedbitset::FixedBitSet;
use serde::Serialize;

use crate::domain::RecordKey;
use crate::error::IngestError;

/// Receives `(key, record)` pairs. Keys must be unique within one sink.
pub trait RecordSink {
    fn write<T: Serialize>(&mut self, key: RecordKey, record: &T) -> Result<(), IngestError>;

    fn written(&self) -> u64;
}

#[derive(Serialize)]
struct Line<'a, T> {
    key: &'a RecordKey,
    record: &'a T,
}

/// Keys already written. Row indices live in a bitset so positional runs
/// cost one bit per input row.
#[derive(Default)]
struct SeenKeys {
    indices: FixedBitSet,
    ids: HashSet<String>,
}

impl SeenKeys {
    fn contains(&self, key: &RecordKey) -> bool {
        match key {
            RecordKey::Index(index) => self.indices.contains(*index),
            RecordKey::Id(id) => self.ids.contains(id),
        }
    }

    fn insert(&mut self, key: RecordKey) {
        match key {
            RecordKey::Index(index) => {
                if index >= self.indices.len() {
                    self.indices.grow(index + 1);
                }
                self.indices.insert(index);
            }
            RecordKey::Id(id) => {
                self.ids.insert(id);
            }
        }
    }
}

/// Writes one `{"key": ..., "record": {...}}` JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    seen: SeenKeys,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            seen: SeenKeys::default(),
            written: 0,
        }
    }

    pub fn into_inner(mut self) -> Result<W, IngestError> {
        self.writer
            .flush()
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write<T: Serialize>(&mut self, key: RecordKey, record: &T) -> Result<(), IngestError> {
        if self.seen.contains(&key) {
            return Err(IngestError::DuplicateKey(key.to_string()));
        }
        serde_json::to_writer(
            &mut self.writer,
            &Line {
                key: &key,
                record,
            },
        )
        .map_err(|err| IngestError::Serialization(err.to_string()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        self.seen.insert(key);
        self.written += 1;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}
