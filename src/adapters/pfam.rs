use std::io::Read;

use crate::adapters::{column, field, log_summary, tsv_reader};
use crate::domain::{IngestSummary, PfamRegionRecord, RecordKey, SkipReason};
use crate::error::IngestError;
use crate::sink::RecordSink;

/// Pfam-A region rows, with coordinates shifted to 0-based half-open ranges.
pub fn generate<R: Read, S: RecordSink>(
    reader: R,
    sink: &mut S,
) -> Result<IngestSummary, IngestError> {
    let mut reader = tsv_reader(reader);
    let headers = reader.headers()?.clone();
    let uniprot_col = column(&headers, "uniprot_acc")?;
    let version_col = column(&headers, "seq_version")?;
    let pfam_col = column(&headers, "pfamA_acc")?;
    let start_col = column(&headers, "seq_start")?;
    let end_col = column(&headers, "seq_end")?;

    let mut summary = IngestSummary::default();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        summary.rows_read += 1;

        let parsed = (
            field(&row, version_col).parse::<i32>(),
            field(&row, start_col).parse::<i32>(),
            field(&row, end_col).parse::<i32>(),
        );
        let (Ok(seq_version), Ok(seq_start), Ok(seq_end)) = parsed else {
            summary.skip(SkipReason::MalformedField);
            continue;
        };
        let Some(start) = seq_start.checked_sub(1) else {
            summary.skip(SkipReason::MalformedField);
            continue;
        };

        let record = PfamRegionRecord {
            uniprot_acc: field(&row, uniprot_col).to_string(),
            pfam_acc: field(&row, pfam_col).to_string(),
            seq_version,
            start,
            end: seq_end,
        };
        sink.write(RecordKey::Index(index), &record)?;
        summary.emitted += 1;
    }
    log_summary("pfam-regions", &summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::JsonLinesSink;

    #[test]
    fn coordinates_become_half_open() {
        let tsv = "uniprot_acc\tseq_version\tcrc64\tmd5\tpfamA_acc\tseq_start\tseq_end\n\
                   A0A0A0\t1\tX\tY\tPF00001\t10\t40\n\
                   A0A0A1\t1\tX\tY\tPF00002\tten\t40\n";
        let mut sink = JsonLinesSink::new(Vec::new());
        let summary = generate(tsv.as_bytes(), &mut sink).unwrap();
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.emitted, 1);
        assert_eq!(summary.skipped(SkipReason::MalformedField), 1);

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let line: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(line["key"], 0);
        assert_eq!(line["record"]["start"], 9);
        assert_eq!(line["record"]["end"], 40);
        assert_eq!(line["record"]["pfam_acc"], "PF00001");
    }

    #[test]
    fn lowest_start_is_malformed() {
        let tsv = "uniprot_acc\tseq_version\tcrc64\tmd5\tpfamA_acc\tseq_start\tseq_end\n\
                   A0A0A0\t1\tX\tY\tPF00001\t-2147483648\t40\n\
                   A0A0A1\t1\tX\tY\tPF00002\t1\t40\n";
        let mut sink = JsonLinesSink::new(Vec::new());
        let summary = generate(tsv.as_bytes(), &mut sink).unwrap();
        assert_eq!(summary.emitted, 1);
        assert_eq!(summary.skipped(SkipReason::MalformedField), 1);

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let line: serde_json::Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(line["key"], 1);
        assert_eq!(line["record"]["start"], 0);
    }
}
