use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::sync::Mutex;

use serde_json::Value;

use kira_ingest::adapters::{hippie, mhcflurry, pfam, stringdb, uniref};
use kira_ingest::backfill::FetchOutcome;
use kira_ingest::config::{MhcOptions, StringOptions};
use kira_ingest::domain::SkipReason;
use kira_ingest::error::IngestError;
use kira_ingest::sink::JsonLinesSink;
use kira_ingest::uniprot::parse_sequence_response;

fn fixture(name: &str) -> BufReader<File> {
    BufReader::new(File::open(format!("tests/fixtures/{name}")).unwrap())
}

fn lines(sink: JsonLinesSink<Vec<u8>>) -> Vec<Value> {
    let bytes = sink.into_inner().unwrap();
    String::from_utf8(bytes)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn keys(records: &[Value]) -> Vec<Value> {
    records.iter().map(|line| line["key"].clone()).collect()
}

#[test]
fn hippie_without_sequences() {
    let mut sink = JsonLinesSink::new(Vec::new());
    let summary = hippie::generate_no_seq(fixture("hippie.mitab.txt"), &mut sink).unwrap();
    assert_eq!(summary.rows_read, 6);
    assert_eq!(summary.emitted, 5);
    assert_eq!(summary.skipped(SkipReason::MissingIdentifier), 1);

    let records = lines(sink);
    assert_eq!(keys(&records), vec![0, 1, 3, 4, 5]);
    assert_eq!(records[4]["record"]["protein_a_identifier"], "P53_HUMAN");
    assert_eq!(records[0]["record"]["protein_a_identifier"], "P04637");
    assert_eq!(records[0]["record"]["protein_b_identifier"], "Q00987");
    let confidence = records[0]["record"]["confidence"].as_f64().unwrap();
    assert!((confidence - 0.87).abs() < 1e-6);
}

#[test]
fn hippie_with_sequences() {
    let response = fs::read_to_string("tests/fixtures/uniprot_response.fasta").unwrap();
    let calls = Mutex::new(Vec::<BTreeSet<String>>::new());
    let fetcher = |accessions: &BTreeSet<String>| -> Result<FetchOutcome, IngestError> {
        calls.lock().unwrap().push(accessions.clone());
        parse_sequence_response(&response, accessions)
    };

    let mut sink = JsonLinesSink::new(Vec::new());
    let (summary, stats) =
        hippie::generate_with_seq(fixture("hippie.mitab.txt"), &mut sink, &fetcher, 40_000)
            .unwrap();

    assert_eq!(summary.rows_read, 6);
    assert_eq!(summary.emitted, 4);
    assert_eq!(summary.skipped(SkipReason::MissingIdentifier), 1);
    assert_eq!(summary.skipped(SkipReason::UnresolvedAccession), 1);
    assert_eq!(stats.fetch_calls, 1);
    assert_eq!(stats.accessions_missing, 1);

    let calls = calls.into_inner().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 7);
    assert!(calls[0].contains("Q9XXX0"));
    assert!(calls[0].contains("P53_HUMAN"));

    let records = lines(sink);
    assert_eq!(keys(&records), vec![0, 1, 4, 5]);
    let first = &records[0]["record"];
    assert!(
        first["protein_a_sequence"]
            .as_str()
            .unwrap()
            .starts_with("MEEPQSDPSV")
    );
    assert!(
        first["protein_b_sequence"]
            .as_str()
            .unwrap()
            .starts_with("MCNTNMSVPT")
    );

    let by_entry_name = &records[3]["record"];
    assert_eq!(by_entry_name["protein_a_sequence"], first["protein_a_sequence"]);
    assert_eq!(by_entry_name["protein_b_sequence"], first["protein_b_sequence"]);
}

#[test]
fn hippie_small_batches_fetch_each_accession_once() {
    let response = fs::read_to_string("tests/fixtures/uniprot_response.fasta").unwrap();
    let calls = Mutex::new(Vec::<BTreeSet<String>>::new());
    let fetcher = |accessions: &BTreeSet<String>| -> Result<FetchOutcome, IngestError> {
        calls.lock().unwrap().push(accessions.clone());
        parse_sequence_response(&response, accessions)
    };

    let mut sink = JsonLinesSink::new(Vec::new());
    let (summary, _) =
        hippie::generate_with_seq(fixture("hippie.mitab.txt"), &mut sink, &fetcher, 1).unwrap();
    assert_eq!(summary.emitted, 4);

    let calls = calls.into_inner().unwrap();
    let total = calls.iter().map(BTreeSet::len).sum::<usize>();
    let distinct = calls.iter().flatten().collect::<BTreeSet<_>>().len();
    assert_eq!(total, distinct);
    assert_eq!(keys(&lines(sink)), vec![0, 1, 4, 5]);
}

#[test]
fn mhc_default_options() {
    let alleles = mhcflurry::allele_sequences(fixture("mhc_sequences.csv")).unwrap();
    let mut sink = JsonLinesSink::new(Vec::new());
    let summary = mhcflurry::generate(
        fixture("mhc_affinity.csv"),
        &alleles,
        &MhcOptions::default(),
        &mut sink,
    )
    .unwrap();

    assert_eq!(summary.rows_read, 6);
    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.skipped(SkipReason::FilteredOut), 1);
    assert_eq!(summary.skipped(SkipReason::MissingSequence), 1);
    assert_eq!(summary.skipped(SkipReason::MalformedField), 1);

    let records = lines(sink);
    assert_eq!(keys(&records), vec![0, 2, 3]);
    let first = &records[0]["record"];
    assert_eq!(first["mhc_allele"], "HLA-A*02:01");
    assert_eq!(first["peptide_sequence"], "SLYNTVATL");
    assert_eq!(first["measurement_inequality"], "=");
    let expected = f64::from(mhcflurry::normalize_affinity(20.0));
    assert!((first["affinity"].as_f64().unwrap() - expected).abs() < 1e-6);
}

#[test]
fn mhc_species_and_inequality_options() {
    let alleles = mhcflurry::allele_sequences(fixture("mhc_sequences.csv")).unwrap();
    let options = MhcOptions {
        normalize_measurement: false,
        include_inequalities: true,
        species: Some(vec!["HLA".to_string()]),
    };
    let mut sink = JsonLinesSink::new(Vec::new());
    let summary =
        mhcflurry::generate(fixture("mhc_affinity.csv"), &alleles, &options, &mut sink).unwrap();
    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.skipped(SkipReason::FilteredOut), 1);

    let records = lines(sink);
    assert_eq!(keys(&records), vec![0, 1, 2]);
    assert_eq!(records[1]["record"]["measurement_inequality"], ">");
    assert_eq!(records[1]["record"]["affinity"].as_f64().unwrap(), 75000.0);
}

#[test]
fn pfam_regions() {
    let mut sink = JsonLinesSink::new(Vec::new());
    let summary = pfam::generate(fixture("pfam_regions.tsv"), &mut sink).unwrap();
    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.skipped(SkipReason::MalformedField), 1);

    let records = lines(sink);
    assert_eq!(keys(&records), vec![0, 1, 3]);
    let first = &records[0]["record"];
    assert_eq!(first["uniprot_acc"], "A0A009E9Z5");
    assert_eq!(first["pfam_acc"], "PF00005");
    assert_eq!(first["seq_version"], 1);
    assert_eq!(first["start"], 30);
    assert_eq!(first["end"], 168);
    assert_eq!(records[2]["record"]["start"], 0);
}

#[test]
fn string_links() {
    let aliases = stringdb::alias_map(fixture("string_aliases.txt"), "Ensembl_UniProt").unwrap();
    assert_eq!(aliases.len(), 5);
    assert_eq!(aliases["9606.ENSP00000269305"], "P04637");

    let mut sink = JsonLinesSink::new(Vec::new());
    let summary = stringdb::generate_links(
        fixture("string_links.txt"),
        &aliases,
        &StringOptions::default(),
        &mut sink,
    )
    .unwrap();
    assert_eq!(summary.rows_read, 5);
    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.skipped(SkipReason::MissingIdentifier), 1);
    assert_eq!(summary.skipped(SkipReason::MalformedField), 1);

    let records = lines(sink);
    assert_eq!(keys(&records), vec![0, 1, 3]);
    assert_eq!(records[0]["record"]["uniprot_acc_1"], "P04637");
    assert_eq!(records[0]["record"]["uniprot_acc_2"], "Q00987");
    assert!((records[0]["record"]["score"].as_f64().unwrap() - 0.999).abs() < 1e-6);
}

#[test]
fn string_links_taxon_filter() {
    let aliases = stringdb::alias_map(fixture("string_aliases.txt"), "Ensembl_UniProt").unwrap();
    let options = StringOptions {
        taxa: Some(vec!["10090".to_string()]),
        ..StringOptions::default()
    };
    let mut sink = JsonLinesSink::new(Vec::new());
    let summary =
        stringdb::generate_links(fixture("string_links.txt"), &aliases, &options, &mut sink)
            .unwrap();
    assert_eq!(summary.emitted, 1);
    assert_eq!(summary.skipped(SkipReason::FilteredOut), 4);
    assert_eq!(keys(&lines(sink)), vec![3]);
}

#[test]
fn uniref_clusters() {
    let mut sink = JsonLinesSink::new(Vec::new());
    let summary = uniref::generate(fixture("uniref50.fasta"), &mut sink).unwrap();
    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.emitted, 2);
    assert_eq!(summary.skipped(SkipReason::MalformedField), 1);

    let records = lines(sink);
    assert_eq!(keys(&records), vec!["UniRef50_Q8WZ42", "UniRef50_P04637"]);
    let titin = &records[0]["record"];
    assert_eq!(titin["cluster_name"], "Titin");
    assert_eq!(titin["num_members"], 1336);
    assert_eq!(titin["tax_name"], "Vertebrata");
    assert_eq!(titin["tax_id"], "7742");
    assert_eq!(titin["representative_member"], "TITIN_HUMAN");
    assert_eq!(titin["aa_sequence"].as_str().unwrap().len(), 120);
    assert_eq!(
        records[1]["record"]["cluster_name"],
        "Cellular tumor antigen p53"
    );
}
