use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Cohort, InterpretationStatus, Sex, curie_prefix};
use crate::phenopacket::{
    Disease, ExternalReference, Individual, Interpretation, MetaData, Phenopacket,
    PhenotypicFeature, embedded_json,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneRecord {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation_status: Option<InterpretationStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation_status: Option<InterpretationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genome_assembly: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromosome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zygosity: Option<String>,
    #[serde(default)]
    pub hgvs_expressions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhenopacketRecord {
    pub id: String,
    #[serde(default)]
    pub cohort: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_sex: Option<Sex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "embedded_json")]
    pub subject: Option<Individual>,

    #[serde(default, deserialize_with = "embedded_json")]
    pub phenotypic_features: Vec<PhenotypicFeature>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub observed_phenotypes: Vec<PhenotypicFeature>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub excluded_phenotypes: Vec<PhenotypicFeature>,

    #[serde(default, deserialize_with = "embedded_json")]
    pub diseases: Vec<Disease>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease_onset: Option<String>,

    #[serde(default, deserialize_with = "embedded_json")]
    pub interpretations: Vec<Interpretation>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub genes: Vec<GeneRecord>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub variants: Vec<VariantRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "embedded_json")]
    pub biosamples: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "embedded_json")]
    pub measurements: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "embedded_json")]
    pub medical_actions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "embedded_json")]
    pub files: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "embedded_json")]
    pub meta_data: Option<MetaData>,

    #[serde(default, deserialize_with = "embedded_json")]
    pub external_references: Vec<ExternalReference>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub pmids: Vec<String>,
}

impl PhenopacketRecord {
    pub fn from_phenopacket(packet: Phenopacket, cohort: &Cohort) -> Self {
        let mut record = PhenopacketRecord {
            id: packet.id,
            cohort: cohort.as_str().to_string(),
            ..Default::default()
        };

        if let Some(subject) = packet.subject {
            record.subject_id = Some(subject.id.clone()).filter(|id| !id.is_empty());
            record.subject_sex = Some(subject.sex.unwrap_or(Sex::Unknown));
            record.subject_age = subject
                .time_at_last_encounter
                .as_ref()
                .and_then(|time| time.age_duration())
                .map(str::to_string);
            record.subject = Some(subject);
        }

        let (excluded, observed): (Vec<_>, Vec<_>) = packet
            .phenotypic_features
            .iter()
            .cloned()
            .partition(|feature| feature.excluded);
        record.observed_phenotypes = observed;
        record.excluded_phenotypes = excluded;
        record.phenotypic_features = packet.phenotypic_features;

        if let Some(first) = packet.diseases.first() {
            record.disease_id = Some(first.term.id.clone()).filter(|id| !id.is_empty());
            record.disease_label = first.term.label.clone();
            record.disease_onset = first
                .onset
                .as_ref()
                .and_then(|onset| onset.age_duration())
                .map(str::to_string);
        }
        record.diseases = packet.diseases;

        let (genes, variants) = collect_genes_and_variants(&packet.interpretations);
        if let Some(gene) = genes.first() {
            record.gene_id = Some(gene.id.clone());
            record.gene_symbol = Some(gene.symbol.clone());
        }
        record.variant_id = variants
            .iter()
            .map(|variant| variant.id.clone())
            .find(|id| !id.is_empty());
        record.genes = genes;
        record.variants = variants;
        record.interpretations = packet.interpretations;

        record.biosamples = packet.biosamples;
        record.measurements = packet.measurements;
        record.medical_actions = packet.medical_actions;
        record.files = packet.files;

        if let Some(meta) = &packet.meta_data {
            record.external_references = meta.external_references.clone();
            record.pmids = pmids_of(&meta.external_references);
        }
        record.meta_data = packet.meta_data;

        record
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn features(&self) -> &[PhenotypicFeature] {
        if self.phenotypic_features.is_empty() {
            &self.observed_phenotypes
        } else {
            &self.phenotypic_features
        }
    }

    pub fn gene_calls(&self) -> Vec<GeneRecord> {
        if self.genes.is_empty() {
            collect_genes_and_variants(&self.interpretations).0
        } else {
            self.genes.clone()
        }
    }

    pub fn publications(&self) -> Vec<String> {
        if !self.pmids.is_empty() {
            return self.pmids.clone();
        }
        let from_refs = pmids_of(&self.external_references);
        if !from_refs.is_empty() {
            return from_refs;
        }
        self.meta_data
            .as_ref()
            .map(|meta| pmids_of(&meta.external_references))
            .unwrap_or_default()
    }
}

fn pmids_of(references: &[ExternalReference]) -> Vec<String> {
    references
        .iter()
        .filter(|reference| curie_prefix(&reference.id) == Some("PMID"))
        .map(|reference| reference.id.clone())
        .collect()
}

fn collect_genes_and_variants(
    interpretations: &[Interpretation],
) -> (Vec<GeneRecord>, Vec<VariantRecord>) {
    let mut genes = Vec::new();
    let mut variants = Vec::new();

    for gi in interpretations
        .iter()
        .flat_map(|interpretation| interpretation.genomic_interpretations())
    {
        let status = gi.interpretation_status;
        if let Some(gene) = gi.resolved_gene() {
            genes.push(GeneRecord {
                id: gene.value_id.clone(),
                symbol: gene.symbol.clone(),
                interpretation_status: status,
            });
        }

        let Some(vd) = gi.variation_descriptor() else {
            continue;
        };
        let vcf = vd.vcf_record.as_ref();
        let non_empty = |value: &str| Some(value.to_string()).filter(|v| !v.is_empty());
        variants.push(VariantRecord {
            id: vd.id.clone(),
            interpretation_status: status,
            gene_symbol: vd
                .gene_context
                .as_ref()
                .and_then(|gene| non_empty(&gene.symbol)),
            gene_id: vd
                .gene_context
                .as_ref()
                .and_then(|gene| non_empty(&gene.value_id)),
            genome_assembly: vcf.and_then(|v| non_empty(&v.genome_assembly)),
            chromosome: vcf.and_then(|v| non_empty(&v.chrom)),
            position: vcf.and_then(|v| non_empty(&v.pos)),
            reference: vcf.and_then(|v| non_empty(&v.reference)),
            alternate: vcf.and_then(|v| non_empty(&v.alt)),
            zygosity: vd.allelic_state.as_ref().and_then(|state| state.label.clone()),
            hgvs_expressions: vd
                .expressions
                .iter()
                .map(|expression| expression.value.clone())
                .filter(|value| !value.is_empty())
                .collect(),
        });
    }

    (genes, variants)
}
