use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const HIPPIE_URL: &str =
    "http://cbdm-01.zdv.uni-mainz.de/~mschaefer/hippie/HIPPIE-current.mitab.txt";
pub const MHC_AFFINITY_URL: &str = "https://raw.githubusercontent.com/iskandr/cd8-tcell-epitope-prediction-data/master/mhcflurry-training-data/peptide-mhc-binding-affinity.csv";
pub const MHC_SEQUENCE_URL: &str = "https://raw.githubusercontent.com/iskandr/cd8-tcell-epitope-prediction-data/master/mhc-sequences/class1_mhc_sequences.csv";
pub const PFAM_REGIONS_URL: &str = "https://ftp.ebi.ac.uk/pub/databases/Pfam/releases/Pfam33.1/Pfam-A.regions.uniprot.tsv.gz";
pub const STRING_ALIASES_URL: &str =
    "https://stringdb-static.org/download/protein.aliases.v11.0.txt.gz";
pub const STRING_LINKS_URL: &str =
    "https://stringdb-static.org/download/protein.links.v11.0.txt.gz";
pub const UNIREF50_URL: &str = "https://ftp.uniprot.org/pub/databases/uniprot/current_release/uniref/uniref50/uniref50.fasta.gz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetName {
    Hippie,
    MhcBindingAffinity,
    PfamRegions,
    StringLinks,
    Uniref50,
}

impl DatasetName {
    pub fn all() -> [DatasetName; 5] {
        [
            DatasetName::Hippie,
            DatasetName::MhcBindingAffinity,
            DatasetName::PfamRegions,
            DatasetName::StringLinks,
            DatasetName::Uniref50,
        ]
    }

    pub fn version(&self) -> &'static str {
        "1.0.0"
    }

    /// Logical file names mapped to the URLs the adapter reads from.
    pub fn sources(&self) -> BTreeMap<String, String> {
        let pairs: &[(&str, &str)] = match self {
            DatasetName::Hippie => &[("mitab_file", HIPPIE_URL)],
            DatasetName::MhcBindingAffinity => &[
                ("affinity_file", MHC_AFFINITY_URL),
                ("mhc_sequence_file", MHC_SEQUENCE_URL),
            ],
            DatasetName::PfamRegions => &[("tsv_file", PFAM_REGIONS_URL)],
            DatasetName::StringLinks => &[
                ("alias_file", STRING_ALIASES_URL),
                ("links_file", STRING_LINKS_URL),
            ],
            DatasetName::Uniref50 => &[("fasta_file", UNIREF50_URL)],
        };
        pairs
            .iter()
            .map(|(name, url)| (name.to_string(), url.to_string()))
            .collect()
    }

    pub fn resolve_variant(
        &self,
        requested: Option<DatasetVariant>,
    ) -> Result<DatasetVariant, IngestError> {
        match (self, requested) {
            (DatasetName::Hippie, None) => Ok(DatasetVariant::NoSeq),
            (DatasetName::Hippie, Some(DatasetVariant::Default)) => Ok(DatasetVariant::NoSeq),
            (DatasetName::Hippie, Some(variant)) => Ok(variant),
            (_, None) | (_, Some(DatasetVariant::Default)) => Ok(DatasetVariant::Default),
            (name, Some(variant)) => Err(IngestError::InvalidConfig(format!(
                "dataset {name} has no variant {variant}"
            ))),
        }
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetName::Hippie => write!(f, "hippie"),
            DatasetName::MhcBindingAffinity => write!(f, "mhc-binding-affinity"),
            DatasetName::PfamRegions => write!(f, "pfam-regions"),
            DatasetName::StringLinks => write!(f, "string-links"),
            DatasetName::Uniref50 => write!(f, "uniref50"),
        }
    }
}

impl FromStr for DatasetName {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        DatasetName::all()
            .into_iter()
            .find(|name| name.to_string() == normalized)
            .ok_or_else(|| IngestError::DatasetNotFound(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetVariant {
    Default,
    NoSeq,
    WithSeq,
}

impl fmt::Display for DatasetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetVariant::Default => write!(f, "default"),
            DatasetVariant::NoSeq => write!(f, "no-seq"),
            DatasetVariant::WithSeq => write!(f, "with-seq"),
        }
    }
}

/// Key a record is stored under: its position in the input or its own identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RecordKey {
    Index(usize),
    Id(String),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Index(index) => write!(f, "{index}"),
            RecordKey::Id(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionRecord {
    #[serde(rename = "protein_a_identifier")]
    pub protein_a_id: String,
    #[serde(rename = "protein_b_identifier")]
    pub protein_b_id: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencedInteraction {
    #[serde(rename = "protein_a_identifier")]
    pub protein_a_id: String,
    #[serde(rename = "protein_b_identifier")]
    pub protein_b_id: String,
    pub confidence: f32,
    pub protein_a_sequence: String,
    pub protein_b_sequence: String,
}

impl SequencedInteraction {
    pub fn new(record: InteractionRecord, sequence_a: String, sequence_b: String) -> Self {
        Self {
            protein_a_id: record.protein_a_id,
            protein_b_id: record.protein_b_id,
            confidence: record.confidence,
            protein_a_sequence: sequence_a,
            protein_b_sequence: sequence_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MeasurementInequality {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">")]
    Greater,
}

impl FromStr for MeasurementInequality {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "=" => Ok(MeasurementInequality::Equal),
            "<" => Ok(MeasurementInequality::Less),
            ">" => Ok(MeasurementInequality::Greater),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MhcAffinityRecord {
    pub mhc_allele: String,
    pub affinity: f32,
    pub measurement_inequality: MeasurementInequality,
    pub peptide_sequence: String,
    pub mhc_sequence: String,
}

/// Domain region with 0-based inclusive `start` and 0-based exclusive `end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PfamRegionRecord {
    pub uniprot_acc: String,
    pub pfam_acc: String,
    pub seq_version: i32,
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringLinkRecord {
    pub uniprot_acc_1: String,
    pub uniprot_acc_2: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniRefClusterRecord {
    pub unique_identifier: String,
    pub cluster_name: String,
    pub num_members: i32,
    pub tax_name: String,
    pub tax_id: String,
    pub representative_member: String,
    pub aa_sequence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    MissingIdentifier,
    MissingSequence,
    UnresolvedAccession,
    MalformedField,
    FilteredOut,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingIdentifier => "missing_identifier",
            SkipReason::MissingSequence => "missing_sequence",
            SkipReason::UnresolvedAccession => "unresolved_accession",
            SkipReason::MalformedField => "malformed_field",
            SkipReason::FilteredOut => "filtered_out",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counts for one adapter run, reported at the end instead of per row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub rows_read: u64,
    pub emitted: u64,
    pub skipped: BTreeMap<String, u64>,
}

impl IngestSummary {
    pub fn skip(&mut self, reason: SkipReason) {
        self.skip_many(reason, 1);
    }

    pub fn skip_many(&mut self, reason: SkipReason, count: u64) {
        if count == 0 {
            return;
        }
        *self.skipped.entry(reason.as_str().to_string()).or_default() += count;
    }

    pub fn skipped(&self, reason: SkipReason) -> u64 {
        self.skipped.get(reason.as_str()).copied().unwrap_or(0)
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }
}
