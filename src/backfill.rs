//! Batched sequence backfill for interaction records.
//!
//! Interaction rows reference two UniProt accessions. Rows whose sequences are
//! already known are emitted right away; the rest wait in a pending queue while
//! their unknown accessions accumulate into a fetch set. Once the fetch set
//! reaches `max_batch_size` (and once more at end of input) the set is resolved
//! with one remote call and the pending queue is replayed in input order.
//! Accessions are fetched at most once per session: resolved ones are cached,
//! unresolvable ones are remembered and never requested again.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{InteractionRecord, SequencedInteraction};
use crate::error::IngestError;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 40_000;

/// Result of resolving one batch of accessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub sequences: HashMap<String, String>,
    pub missing: BTreeSet<String>,
}

/// Resolves a batch of accessions to amino-acid sequences in one blocking call.
pub trait SequenceFetcher: Send + Sync {
    fn fetch(&self, accessions: &BTreeSet<String>) -> Result<FetchOutcome, IngestError>;
}

impl<F> SequenceFetcher for F
where
    F: Fn(&BTreeSet<String>) -> Result<FetchOutcome, IngestError> + Send + Sync,
{
    fn fetch(&self, accessions: &BTreeSet<String>) -> Result<FetchOutcome, IngestError> {
        self(accessions)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillStats {
    pub records_in: u64,
    pub emitted_immediately: u64,
    pub emitted_after_flush: u64,
    pub dropped_unresolved: u64,
    pub fetch_calls: u64,
    pub accessions_requested: u64,
    pub accessions_resolved: u64,
    pub accessions_missing: u64,
}

impl BackfillStats {
    pub fn emitted(&self) -> u64 {
        self.emitted_immediately + self.emitted_after_flush
    }
}

/// One join session. All state lives here and is dropped with the session.
pub struct SequenceBackfill<'f, F: SequenceFetcher + ?Sized> {
    fetcher: &'f F,
    max_batch_size: usize,
    cache: HashMap<String, String>,
    missing: HashSet<String>,
    pending: Vec<(usize, InteractionRecord)>,
    fetch_set: BTreeSet<String>,
    stats: BackfillStats,
}

impl<'f, F: SequenceFetcher + ?Sized> SequenceBackfill<'f, F> {
    pub fn new(fetcher: &'f F, max_batch_size: usize) -> Result<Self, IngestError> {
        if max_batch_size == 0 {
            return Err(IngestError::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            fetcher,
            max_batch_size,
            cache: HashMap::new(),
            missing: HashSet::new(),
            pending: Vec::new(),
            fetch_set: BTreeSet::new(),
            stats: BackfillStats::default(),
        })
    }

    /// Seeds the sequence cache, e.g. with sequences resolved by an earlier stage.
    pub fn with_cache(mut self, cache: HashMap<String, String>) -> Self {
        self.cache
            .extend(cache.into_iter().filter(|(_, seq)| !seq.is_empty()));
        self
    }

    pub fn stats(&self) -> &BackfillStats {
        &self.stats
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn fetch_set_len(&self) -> usize {
        self.fetch_set.len()
    }

    pub fn is_cached(&self, accession: &str) -> bool {
        self.cache.contains_key(accession)
    }

    pub fn is_missing(&self, accession: &str) -> bool {
        self.missing.contains(accession)
    }

    pub fn push<E>(
        &mut self,
        index: usize,
        record: InteractionRecord,
        emit: &mut E,
    ) -> Result<(), IngestError>
    where
        E: FnMut(usize, SequencedInteraction) -> Result<(), IngestError>,
    {
        self.stats.records_in += 1;
        self.queue_fetch(&record.protein_a_id);
        self.queue_fetch(&record.protein_b_id);

        if let Some(resolved) = self.resolve(&record) {
            self.stats.emitted_immediately += 1;
            emit(index, SequencedInteraction::new(record, resolved.0, resolved.1))?;
        } else if self.is_missing(&record.protein_a_id) || self.is_missing(&record.protein_b_id)
        {
            // Can never resolve; no need to hold it until the next flush.
            self.stats.dropped_unresolved += 1;
        } else {
            self.pending.push((index, record));
        }

        if self.fetch_set.len() >= self.max_batch_size {
            self.flush(emit)?;
        }
        Ok(())
    }

    /// Final flush. Safe to call more than once.
    pub fn finish<E>(&mut self, emit: &mut E) -> Result<(), IngestError>
    where
        E: FnMut(usize, SequencedInteraction) -> Result<(), IngestError>,
    {
        self.flush(emit)
    }

    pub fn process<I, E>(mut self, records: I, mut emit: E) -> Result<BackfillStats, IngestError>
    where
        I: IntoIterator<Item = (usize, InteractionRecord)>,
        E: FnMut(usize, SequencedInteraction) -> Result<(), IngestError>,
    {
        for (index, record) in records {
            self.push(index, record, &mut emit)?;
        }
        self.finish(&mut emit)?;
        Ok(self.stats)
    }

    /// Lazily backfills a fallible record stream. Errors end the stream.
    pub fn stream<I>(self, records: I) -> Backfilled<'f, F, I::IntoIter>
    where
        I: IntoIterator<Item = Result<(usize, InteractionRecord), IngestError>>,
    {
        Backfilled {
            session: self,
            input: records.into_iter(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn queue_fetch(&mut self, accession: &str) {
        if !self.cache.contains_key(accession) && !self.missing.contains(accession) {
            self.fetch_set.insert(accession.to_string());
        }
    }

    fn resolve(&self, record: &InteractionRecord) -> Option<(String, String)> {
        let a = self.cache.get(&record.protein_a_id)?;
        let b = self.cache.get(&record.protein_b_id)?;
        Some((a.clone(), b.clone()))
    }

    fn flush<E>(&mut self, emit: &mut E) -> Result<(), IngestError>
    where
        E: FnMut(usize, SequencedInteraction) -> Result<(), IngestError>,
    {
        if !self.fetch_set.is_empty() {
            let requested = std::mem::take(&mut self.fetch_set);
            info!(
                accessions = requested.len(),
                pending = self.pending.len(),
                "retrieving sequences"
            );
            let outcome = self.fetcher.fetch(&requested)?;
            self.stats.fetch_calls += 1;
            self.stats.accessions_requested += requested.len() as u64;
            self.merge(requested, outcome);
            info!(
                cached = self.cache.len(),
                missing = self.missing.len(),
                "done retrieving sequences"
            );
        }

        let pending = std::mem::take(&mut self.pending);
        let mut dropped = 0u64;
        for (index, record) in pending {
            match self.resolve(&record) {
                Some((a, b)) => {
                    self.stats.emitted_after_flush += 1;
                    emit(index, SequencedInteraction::new(record, a, b))?;
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!(dropped, "dropped records with unresolved accessions");
        }
        self.stats.dropped_unresolved += dropped;
        Ok(())
    }

    fn merge(&mut self, requested: BTreeSet<String>, outcome: FetchOutcome) {
        for (accession, sequence) in outcome.sequences {
            if sequence.is_empty() || self.missing.contains(&accession) {
                continue;
            }
            if !self.cache.contains_key(&accession) && requested.contains(&accession) {
                self.stats.accessions_resolved += 1;
            }
            self.cache.insert(accession, sequence);
        }
        // Anything asked for and not answered counts as missing, reported or not.
        for accession in requested.into_iter().chain(outcome.missing) {
            if !self.cache.contains_key(&accession) && self.missing.insert(accession) {
                self.stats.accessions_missing += 1;
            }
        }
    }
}

/// Iterator form of a session: a lazy, finite, non-restartable stream of
/// resolved records.
pub struct Backfilled<'f, F: SequenceFetcher + ?Sized, I> {
    session: SequenceBackfill<'f, F>,
    input: I,
    ready: VecDeque<(usize, SequencedInteraction)>,
    done: bool,
}

impl<'f, F, I> Backfilled<'f, F, I>
where
    F: SequenceFetcher + ?Sized,
{
    pub fn stats(&self) -> &BackfillStats {
        self.session.stats()
    }

    pub fn into_stats(self) -> BackfillStats {
        self.session.stats
    }
}

impl<'f, F, I> Iterator for Backfilled<'f, F, I>
where
    F: SequenceFetcher + ?Sized,
    I: Iterator<Item = Result<(usize, InteractionRecord), IngestError>>,
{
    type Item = Result<(usize, SequencedInteraction), IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            let ready = &mut self.ready;
            let mut emit = |index, record| {
                ready.push_back((index, record));
                Ok(())
            };
            let step = match self.input.next() {
                Some(Ok((index, record))) => self.session.push(index, record, &mut emit),
                Some(Err(err)) => Err(err),
                None => {
                    self.done = true;
                    self.session.finish(&mut emit)
                }
            };
            if let Err(err) = step {
                self.done = true;
                self.ready.clear();
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn record(a: &str, b: &str) -> InteractionRecord {
        InteractionRecord {
            protein_a_id: a.to_string(),
            protein_b_id: b.to_string(),
            confidence: 0.5,
        }
    }

    struct Stub {
        known: HashMap<String, String>,
        calls: Mutex<Vec<BTreeSet<String>>>,
    }

    impl Stub {
        fn new(known: &[(&str, &str)]) -> Self {
            Self {
                known: known
                    .iter()
                    .map(|(acc, seq)| (acc.to_string(), seq.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl SequenceFetcher for Stub {
        fn fetch(&self, accessions: &BTreeSet<String>) -> Result<FetchOutcome, IngestError> {
            self.calls.lock().unwrap().push(accessions.clone());
            let mut outcome = FetchOutcome::default();
            for acc in accessions {
                match self.known.get(acc) {
                    Some(seq) => {
                        outcome.sequences.insert(acc.clone(), seq.clone());
                    }
                    None => {
                        outcome.missing.insert(acc.clone());
                    }
                }
            }
            Ok(outcome)
        }
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let stub = Stub::new(&[]);
        assert!(SequenceBackfill::new(&stub, 0).is_err());
    }

    #[test]
    fn known_missing_accession_is_dropped_without_queueing() {
        let stub = Stub::new(&[("A", "MKV")]);
        let mut session = SequenceBackfill::new(&stub, 1).unwrap();
        let mut out = Vec::new();
        let mut emit = |i: usize, r: SequencedInteraction| -> Result<(), IngestError> {
            out.push((i, r));
            Ok(())
        };
        session.push(0, record("A", "C"), &mut emit).unwrap();
        assert!(session.is_missing("C"));
        session.push(1, record("C", "A"), &mut emit).unwrap();
        assert_eq!(session.pending_len(), 0);
        assert_eq!(session.fetch_set_len(), 0);
        assert_eq!(session.stats().dropped_unresolved, 2);
        assert!(out.is_empty());
    }

    #[test]
    fn omitted_accessions_become_missing() {
        let fetcher = |_: &BTreeSet<String>| -> Result<FetchOutcome, IngestError> {
            let mut outcome = FetchOutcome::default();
            outcome.sequences.insert("A".to_string(), "MKV".to_string());
            outcome.sequences.insert("B".to_string(), String::new());
            Ok(outcome)
        };
        let mut session = SequenceBackfill::new(&fetcher, 10).unwrap();
        let mut emit = |_: usize, _: SequencedInteraction| -> Result<(), IngestError> { Ok(()) };
        session.push(0, record("A", "B"), &mut emit).unwrap();
        session.push(1, record("A", "Z"), &mut emit).unwrap();
        session.finish(&mut emit).unwrap();
        assert!(session.is_cached("A"));
        assert!(session.is_missing("B"));
        assert!(session.is_missing("Z"));
        assert!(!session.is_cached("B"));
        assert_eq!(session.stats().accessions_missing, 2);
    }

    #[test]
    fn emit_error_aborts() {
        let stub = Stub::new(&[("A", "MKV"), ("B", "MKV")]);
        let session = SequenceBackfill::new(&stub, 2).unwrap();
        let err = session
            .process(vec![(0, record("A", "B"))], |_, _| {
                Err(IngestError::DuplicateKey("0".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, IngestError::DuplicateKey(_)));
    }
}
