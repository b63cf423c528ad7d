use std::fs::File;
use std::io::{self, BufRead, BufReader};

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::biolink::{Edge, EdgeKind, Node};
use crate::domain::{CaseId, Cohort, InterpretationStatus, Sex};
use crate::error::IngestError;
use crate::kgx::{KgxOutput, KgxWriter};
use crate::record::PhenopacketRecord;

const PROGRESS_EVERY: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Node(Node),
    Edge(Edge),
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    pub records: usize,
    pub nodes: usize,
    pub edges: usize,
    pub phenotype_edges: usize,
    pub disease_edges: usize,
    pub gene_edges: usize,
    pub nodes_path: String,
    pub edges_path: String,
}

pub struct PhenopacketTransformer;

impl PhenopacketTransformer {
    pub fn process_record(record: &PhenopacketRecord) -> Result<Vec<Entity>, IngestError> {
        let cohort = if record.cohort.is_empty() {
            Cohort::unknown()
        } else {
            record.cohort.parse()?
        };
        let case_id = CaseId::new(&cohort, &record.id)?;
        let publications = record.publications();

        let mut entities = vec![Entity::Node(Self::case_node(record, &case_id, &publications))];
        entities.extend(
            Self::phenotype_edges(record, &case_id, &publications)
                .chain(Self::disease_edges(record, &case_id, &publications))
                .chain(Self::gene_edges(record, &case_id, &publications))
                .map(Entity::Edge),
        );
        Ok(entities)
    }

    fn case_node(record: &PhenopacketRecord, case_id: &CaseId, publications: &[String]) -> Node {
        let sex = record
            .subject_sex
            .or_else(|| record.subject.as_ref().and_then(|s| s.sex));
        let mut node = Node::case(case_id.as_str());
        node.name = record
            .subject_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| Some(record.id.clone()));
        node.has_biological_sex = sex
            .filter(|sex| *sex != Sex::Unknown)
            .map(|sex| sex.label().to_string());
        node.age = record.subject_age.clone().or_else(|| {
            record
                .subject
                .as_ref()
                .and_then(|s| s.time_at_last_encounter.as_ref())
                .and_then(|t| t.age_duration())
                .map(str::to_string)
        });
        node.publications = publications.to_vec();
        node
    }

    fn phenotype_edges<'a>(
        record: &'a PhenopacketRecord,
        case_id: &'a CaseId,
        publications: &'a [String],
    ) -> impl Iterator<Item = Edge> + 'a {
        record
            .features()
            .iter()
            .filter(|feature| !feature.excluded && !feature.term.id.is_empty())
            .enumerate()
            .map(move |(n, feature)| {
                let mut edge = case_edge(EdgeKind::Phenotype, case_id, n, &feature.term.id);
                edge.onset_qualifier = feature
                    .onset
                    .as_ref()
                    .and_then(|onset| onset.qualifier())
                    .map(str::to_string);
                edge.publications = publications.to_vec();
                edge
            })
    }

    fn disease_edges<'a>(
        record: &'a PhenopacketRecord,
        case_id: &'a CaseId,
        publications: &'a [String],
    ) -> impl Iterator<Item = Edge> + 'a {
        record
            .diseases
            .iter()
            .filter(|disease| !disease.term.id.is_empty())
            .enumerate()
            .map(move |(n, disease)| {
                let mut edge = case_edge(EdgeKind::Disease, case_id, n, &disease.term.id);
                edge.negated = disease.excluded.then_some(true);
                edge.onset_qualifier = disease
                    .onset
                    .as_ref()
                    .and_then(|onset| onset.qualifier())
                    .map(str::to_string);
                edge.publications = publications.to_vec();
                edge
            })
    }

    fn gene_edges<'a>(
        record: &'a PhenopacketRecord,
        case_id: &'a CaseId,
        publications: &'a [String],
    ) -> impl Iterator<Item = Edge> + 'a {
        record
            .gene_calls()
            .into_iter()
            .filter(|gene| {
                !gene.id.is_empty() && InterpretationStatus::links_gene(gene.interpretation_status)
            })
            .enumerate()
            .map(move |(n, gene)| {
                let mut edge = case_edge(EdgeKind::Gene, case_id, n, &gene.id);
                edge.publications = publications.to_vec();
                edge
            })
    }
}

fn case_edge(kind: EdgeKind, case_id: &CaseId, n: usize, object: &str) -> Edge {
    Edge::new(
        kind,
        format!("{case_id}#{}-{n}", kind.label()),
        case_id.as_str(),
        object,
    )
}

pub fn transform_jsonl<F>(
    jsonl: &Utf8Path,
    mut writer: KgxWriter,
    row_limit: Option<usize>,
    mut progress: F,
) -> Result<TransformSummary, IngestError>
where
    F: FnMut(usize),
{
    let file = File::open(jsonl.as_std_path()).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            IngestError::JsonlNotFound(jsonl.to_string())
        } else {
            IngestError::Filesystem(format!("open {jsonl}: {err}"))
        }
    })?;
    let malformed = |line: usize, message: String| IngestError::MalformedRecord {
        path: jsonl.to_string(),
        line,
        message,
    };

    let mut records = 0usize;
    let mut counts = [0usize; 3];
    for (index, line) in BufReader::new(file).lines().enumerate() {
        if row_limit.is_some_and(|limit| records >= limit) {
            break;
        }
        let line = line.map_err(|err| IngestError::Filesystem(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: PhenopacketRecord =
            serde_json::from_str(&line).map_err(|err| malformed(index + 1, err.to_string()))?;
        let entities = PhenopacketTransformer::process_record(&record)
            .map_err(|err| malformed(index + 1, err.to_string()))?;

        for entity in &entities {
            match entity {
                Entity::Node(node) => writer.write_node(node)?,
                Entity::Edge(edge) => {
                    writer.write_edge(edge)?;
                    counts[edge.kind as usize] += 1;
                }
            }
        }
        records += 1;
        if records % PROGRESS_EVERY == 0 {
            info!("transformed {records} records");
            progress(records);
        }
    }
    progress(records);

    let KgxOutput {
        nodes_path,
        edges_path,
        nodes,
        edges,
    } = writer.finish()?;
    info!(records, nodes, edges, "transform complete");

    Ok(TransformSummary {
        records,
        nodes,
        edges,
        phenotype_edges: counts[EdgeKind::Phenotype as usize],
        disease_edges: counts[EdgeKind::Disease as usize],
        gene_edges: counts[EdgeKind::Gene as usize],
        nodes_path,
        edges_path,
    })
}
