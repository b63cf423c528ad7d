use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::{InterpretationStatus, Sex, is_valid_phenopacket_id};

static CAMEL_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap());
static CAMEL_TAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

pub type Extra = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyClass {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Age {
    #[serde(default)]
    pub iso8601duration: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<Age>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ontology_class: Option<OntologyClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl TimeElement {
    pub fn age_duration(&self) -> Option<&str> {
        self.age
            .as_ref()
            .map(|age| age.iso8601duration.as_str())
            .filter(|value| !value.is_empty())
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.age_duration().or_else(|| {
            self.ontology_class
                .as_ref()
                .map(|class| class.id.as_str())
                .filter(|id| !id.is_empty())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_at_last_encounter: Option<TimeElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<Sex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxonomy: Option<OntologyClass>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhenotypicFeature {
    #[serde(rename = "type", default)]
    pub term: OntologyClass,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset: Option<TimeElement>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Disease {
    #[serde(default)]
    pub term: OntologyClass,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset: Option<TimeElement>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneDescriptor {
    #[serde(default)]
    pub value_id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VcfRecord {
    #[serde(default)]
    pub genome_assembly: String,
    #[serde(default)]
    pub chrom: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub pos: String,
    #[serde(rename = "ref", default)]
    pub reference: String,
    #[serde(default)]
    pub alt: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(default)]
    pub syntax: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariationDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_context: Option<GeneDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcf_record: Option<VcfRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allelic_state: Option<OntologyClass>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantInterpretation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acmg_pathogenicity_classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_descriptor: Option<VariationDescriptor>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenomicInterpretation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_or_biosample_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation_status: Option<InterpretationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene: Option<GeneDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_interpretation: Option<VariantInterpretation>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl GenomicInterpretation {
    pub fn variation_descriptor(&self) -> Option<&VariationDescriptor> {
        self.variant_interpretation
            .as_ref()
            .and_then(|vi| vi.variation_descriptor.as_ref())
    }

    pub fn resolved_gene(&self) -> Option<&GeneDescriptor> {
        self.gene
            .as_ref()
            .filter(|gene| !gene.value_id.is_empty())
            .or_else(|| {
                self.variation_descriptor()
                    .and_then(|vd| vd.gene_context.as_ref())
                    .filter(|gene| !gene.value_id.is_empty())
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<OntologyClass>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genomic_interpretations: Vec<GenomicInterpretation>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<Diagnosis>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Interpretation {
    pub fn genomic_interpretations(&self) -> &[GenomicInterpretation] {
        self.diagnosis
            .as_ref()
            .map(|diagnosis| diagnosis.genomic_interpretations.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalReference {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phenopacket_schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_references: Vec<ExternalReference>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phenopacket {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: Option<Individual>,
    #[serde(default)]
    pub phenotypic_features: Vec<PhenotypicFeature>,
    #[serde(default)]
    pub diseases: Vec<Disease>,
    #[serde(default)]
    pub interpretations: Vec<Interpretation>,
    #[serde(default)]
    pub biosamples: Vec<Value>,
    #[serde(default)]
    pub measurements: Vec<Value>,
    #[serde(default)]
    pub medical_actions: Vec<Value>,
    #[serde(default)]
    pub files: Vec<Value>,
    #[serde(default)]
    pub meta_data: Option<MetaData>,
}

impl Phenopacket {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        serde_json::from_value(normalize_keys(value))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("phenopacket has no id".to_string());
        }
        if !is_valid_phenopacket_id(&self.id) {
            return Err(format!("phenopacket id {:?} has surrounding whitespace", self.id));
        }
        Ok(())
    }
}

pub fn camel_to_snake(name: &str) -> String {
    let first = CAMEL_WORD.replace_all(name, "${1}_${2}");
    CAMEL_TAIL
        .replace_all(&first, "${1}_${2}")
        .to_lowercase()
}

pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (camel_to_snake(&key), normalize_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}

pub(crate) fn embedded_json<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(T::default()),
        Value::String(text) if text.trim().is_empty() => return Ok(T::default()),
        Value::String(text) => serde_json::from_str(&text).map_err(de::Error::custom)?,
        other => other,
    };
    serde_json::from_value(value).map_err(de::Error::custom)
}
