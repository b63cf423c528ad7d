use serde::Serialize;

pub const CASE: &str = "biolink:Case";
pub const HUMAN_TAXON: &str = "NCBITaxon:9606";
pub const PRIMARY_KNOWLEDGE_SOURCE: &str = "infores:phenopacket-store";
pub const AGGREGATOR_KNOWLEDGE_SOURCE: &str = "infores:monarchinitiative";
pub const KNOWLEDGE_LEVEL: &str = "observation";
pub const AGENT_TYPE: &str = "manual_agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Phenotype,
    Disease,
    Gene,
}

impl EdgeKind {
    pub fn category(self) -> &'static str {
        match self {
            EdgeKind::Phenotype => "biolink:CaseToPhenotypicFeatureAssociation",
            EdgeKind::Disease => "biolink:CaseToDiseaseAssociation",
            EdgeKind::Gene => "biolink:CaseToGeneAssociation",
        }
    }

    pub fn predicate(self) -> &'static str {
        match self {
            EdgeKind::Phenotype => "biolink:has_phenotype",
            EdgeKind::Disease => "biolink:has_disease",
            EdgeKind::Gene => "biolink:has_gene",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EdgeKind::Phenotype => "phenotype",
            EdgeKind::Disease => "disease",
            EdgeKind::Gene => "gene",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Slot<'a> {
    Text(Option<&'a str>),
    List(&'a [String]),
    Flag(Option<bool>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub category: Vec<String>,
    pub name: Option<String>,
    pub in_taxon: Option<String>,
    pub has_biological_sex: Option<String>,
    pub age: Option<String>,
    pub provided_by: Vec<String>,
    pub publications: Vec<String>,
}

impl Node {
    pub fn case(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: vec![CASE.to_string()],
            in_taxon: Some(HUMAN_TAXON.to_string()),
            provided_by: vec![PRIMARY_KNOWLEDGE_SOURCE.to_string()],
            ..Default::default()
        }
    }

    pub fn slot(&self, column: &str) -> Option<Slot<'_>> {
        Some(match column {
            "id" => Slot::Text(Some(&self.id)),
            "category" => Slot::List(&self.category),
            "name" => Slot::Text(self.name.as_deref()),
            "in_taxon" => Slot::Text(self.in_taxon.as_deref()),
            "has_biological_sex" => Slot::Text(self.has_biological_sex.as_deref()),
            "age" => Slot::Text(self.age.as_deref()),
            "provided_by" => Slot::List(&self.provided_by),
            "publications" => Slot::List(&self.publications),
            _ => return None,
        })
    }

    pub fn has_slot(column: &str) -> bool {
        Node::default().slot(column).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub id: String,
    pub kind: EdgeKind,
    pub subject: String,
    pub object: String,
    pub negated: Option<bool>,
    pub onset_qualifier: Option<String>,
    pub publications: Vec<String>,
    pub primary_knowledge_source: String,
    pub aggregator_knowledge_source: Vec<String>,
}

impl Edge {
    pub fn new(kind: EdgeKind, id: String, subject: &str, object: &str) -> Self {
        Self {
            id,
            kind,
            subject: subject.to_string(),
            object: object.to_string(),
            negated: None,
            onset_qualifier: None,
            publications: Vec::new(),
            primary_knowledge_source: PRIMARY_KNOWLEDGE_SOURCE.to_string(),
            aggregator_knowledge_source: vec![AGGREGATOR_KNOWLEDGE_SOURCE.to_string()],
        }
    }

    pub fn slot(&self, column: &str) -> Option<Slot<'_>> {
        Some(match column {
            "id" => Slot::Text(Some(&self.id)),
            "category" => Slot::Text(Some(self.kind.category())),
            "subject" => Slot::Text(Some(&self.subject)),
            "predicate" => Slot::Text(Some(self.kind.predicate())),
            "object" => Slot::Text(Some(&self.object)),
            "negated" => Slot::Flag(self.negated),
            "onset_qualifier" => Slot::Text(self.onset_qualifier.as_deref()),
            "publications" => Slot::List(&self.publications),
            "knowledge_level" => Slot::Text(Some(KNOWLEDGE_LEVEL)),
            "agent_type" => Slot::Text(Some(AGENT_TYPE)),
            "primary_knowledge_source" => Slot::Text(Some(&self.primary_knowledge_source)),
            "aggregator_knowledge_source" => Slot::List(&self.aggregator_knowledge_source),
            _ => return None,
        })
    }

    pub fn has_slot(column: &str) -> bool {
        Edge::new(EdgeKind::Gene, String::new(), "", "")
            .slot(column)
            .is_some()
    }
}
