//! MHC class I binding affinity measurements paired with MHC sequences.

use std::collections::HashMap;
use std::io::Read;

use tracing::warn;

use crate::adapters::{column, csv_reader, field, log_summary};
use crate::config::MhcOptions;
use crate::domain::{IngestSummary, MeasurementInequality, MhcAffinityRecord, RecordKey, SkipReason};
use crate::error::IngestError;
use crate::sink::RecordSink;

/// Upper bound of the IC50 range (nM) used for normalization.
pub const MAX_AFFINITY_NM: f32 = 50_000.0;

/// Maps IC50 (nM) onto `[0, 1]`, where higher means stronger binding.
pub fn normalize_affinity(value: f32) -> f32 {
    let clamped = value.clamp(1.0, MAX_AFFINITY_NM);
    1.0 - clamped.ln() / MAX_AFFINITY_NM.ln()
}

/// Species prefix of an allele name, e.g. `HLA` for `HLA-A*02:01`.
pub fn species_of(allele: &str) -> &str {
    allele.split('-').next().unwrap_or(allele)
}

/// Allele name → MHC amino-acid sequence from a `name,seq` CSV.
pub fn allele_sequences<R: Read>(reader: R) -> Result<HashMap<String, String>, IngestError> {
    let mut reader = csv_reader(reader);
    let headers = reader.headers()?.clone();
    let name = column(&headers, "name")?;
    let seq = column(&headers, "seq")?;

    let mut sequences = HashMap::new();
    for row in reader.records() {
        let row = row?;
        let sequence = field(&row, seq);
        if sequence.is_empty() {
            continue;
        }
        sequences.insert(field(&row, name).to_string(), sequence.to_string());
    }
    Ok(sequences)
}

pub fn generate<R: Read, S: RecordSink>(
    affinity: R,
    alleles: &HashMap<String, String>,
    options: &MhcOptions,
    sink: &mut S,
) -> Result<IngestSummary, IngestError> {
    let mut reader = csv_reader(affinity);
    let headers = reader.headers()?.clone();
    let allele_col = column(&headers, "allele")?;
    let peptide_col = column(&headers, "peptide")?;
    let value_col = column(&headers, "measurement_value")?;
    let inequality_col = column(&headers, "measurement_inequality")?;

    let mut summary = IngestSummary::default();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        summary.rows_read += 1;

        let allele = field(&row, allele_col);
        let Some(mhc_sequence) = alleles.get(allele) else {
            summary.skip(SkipReason::MissingSequence);
            continue;
        };
        let value = field(&row, value_col).parse::<f32>();
        let inequality = field(&row, inequality_col).parse::<MeasurementInequality>();
        let (Ok(value), Ok(inequality)) = (value, inequality) else {
            summary.skip(SkipReason::MalformedField);
            continue;
        };
        if let Some(species) = &options.species
            && !species.iter().any(|s| s == species_of(allele))
        {
            summary.skip(SkipReason::FilteredOut);
            continue;
        }
        if !options.include_inequalities && inequality != MeasurementInequality::Equal {
            summary.skip(SkipReason::FilteredOut);
            continue;
        }

        let affinity = if options.normalize_measurement {
            normalize_affinity(value)
        } else {
            value
        };
        let record = MhcAffinityRecord {
            mhc_allele: allele.to_string(),
            affinity,
            measurement_inequality: inequality,
            peptide_sequence: field(&row, peptide_col).to_string(),
            mhc_sequence: mhc_sequence.clone(),
        };
        sink.write(RecordKey::Index(index), &record)?;
        summary.emitted += 1;
    }

    let missing = summary.skipped(SkipReason::MissingSequence);
    if missing > 0 {
        warn!(missing, "affinity rows without an MHC sequence");
    }
    log_summary("mhc-binding-affinity", &summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_bounds() {
        assert!((normalize_affinity(1.0) - 1.0).abs() < 1e-6);
        assert!(normalize_affinity(50_000.0).abs() < 1e-6);
        assert!(normalize_affinity(120_000.0).abs() < 1e-6);
        assert!((normalize_affinity(0.0) - 1.0).abs() < 1e-6);
        let mid = normalize_affinity(500.0);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn species_prefix() {
        assert_eq!(species_of("HLA-A*02:01"), "HLA");
        assert_eq!(species_of("H2-Kb"), "H2");
        assert_eq!(species_of("BoLA"), "BoLA");
    }

    #[test]
    fn sequence_map_skips_blank_sequences() {
        let csv = "name,seq\nHLA-A*02:01,MAVMAPRTL\nHLA-B*07:02,\n";
        let map = allele_sequences(csv.as_bytes()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["HLA-A*02:01"], "MAVMAPRTL");
    }
}
