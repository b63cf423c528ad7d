use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::biolink::{Edge, Node, Slot};
use crate::error::IngestError;
use crate::store::{persist, temp_file_beside};

const LIST_SEPARATOR: &str = "|";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KgxColumns {
    nodes: Vec<String>,
    edges: Vec<String>,
}

impl KgxColumns {
    pub fn new(nodes: Vec<String>, edges: Vec<String>) -> Result<Self, IngestError> {
        if let Some(column) = nodes.iter().find(|c| !Node::has_slot(c)) {
            return Err(IngestError::UnknownColumn {
                kind: "node",
                column: column.clone(),
            });
        }
        if let Some(column) = edges.iter().find(|c| !Edge::has_slot(c)) {
            return Err(IngestError::UnknownColumn {
                kind: "edge",
                column: column.clone(),
            });
        }
        if !nodes.iter().any(|c| c == "id") || !edges.iter().any(|c| c == "id") {
            return Err(IngestError::InvalidConfig(
                "node and edge columns must include `id`".to_string(),
            ));
        }
        Ok(Self { nodes, edges })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KgxOutput {
    pub nodes_path: String,
    pub edges_path: String,
    pub nodes: usize,
    pub edges: usize,
}

enum Sink {
    Plain(BufWriter<NamedTempFile>),
    Gzip(GzEncoder<BufWriter<NamedTempFile>>),
}

impl Sink {
    fn open(dest: &Utf8Path, compress: bool) -> Result<Self, IngestError> {
        let buffered = BufWriter::new(temp_file_beside(dest, ".kgx")?);
        Ok(if compress {
            Sink::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            Sink::Plain(buffered)
        })
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Sink::Plain(w) => w,
            Sink::Gzip(w) => w,
        }
    }

    fn finish(self) -> io::Result<NamedTempFile> {
        let buffered = match self {
            Sink::Plain(w) => w,
            Sink::Gzip(w) => w.finish()?,
        };
        buffered.into_inner().map_err(|err| err.into_error())
    }
}

pub struct KgxWriter {
    columns: KgxColumns,
    nodes: Sink,
    edges: Sink,
    nodes_path: Utf8PathBuf,
    edges_path: Utf8PathBuf,
    node_count: usize,
    edge_count: usize,
}

impl KgxWriter {
    pub fn create(
        output_dir: &Utf8Path,
        name: &str,
        compress: bool,
        columns: KgxColumns,
    ) -> Result<Self, IngestError> {
        let ext = if compress { "tsv.gz" } else { "tsv" };
        let nodes_path = output_dir.join(format!("{name}_nodes.{ext}"));
        let edges_path = output_dir.join(format!("{name}_edges.{ext}"));

        let mut writer = Self {
            nodes: Sink::open(&nodes_path, compress)?,
            edges: Sink::open(&edges_path, compress)?,
            columns,
            nodes_path,
            edges_path,
            node_count: 0,
            edge_count: 0,
        };
        write_row(writer.nodes.writer(), writer.columns.nodes.iter().map(String::clone))?;
        write_row(writer.edges.writer(), writer.columns.edges.iter().map(String::clone))?;
        Ok(writer)
    }

    pub fn write_node(&mut self, node: &Node) -> Result<(), IngestError> {
        let cells = self
            .columns
            .nodes
            .iter()
            .map(|column| node.slot(column).map(format_cell).unwrap_or_default());
        write_row(self.nodes.writer(), cells)?;
        self.node_count += 1;
        Ok(())
    }

    pub fn write_edge(&mut self, edge: &Edge) -> Result<(), IngestError> {
        let cells = self
            .columns
            .edges
            .iter()
            .map(|column| edge.slot(column).map(format_cell).unwrap_or_default());
        write_row(self.edges.writer(), cells)?;
        self.edge_count += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<KgxOutput, IngestError> {
        let fs_err = |err: io::Error| IngestError::Filesystem(err.to_string());
        let nodes = self.nodes.finish().map_err(fs_err)?;
        let edges = self.edges.finish().map_err(fs_err)?;
        persist(nodes, &self.nodes_path)?;
        persist(edges, &self.edges_path)?;
        Ok(KgxOutput {
            nodes_path: self.nodes_path.to_string(),
            edges_path: self.edges_path.to_string(),
            nodes: self.node_count,
            edges: self.edge_count,
        })
    }
}

fn write_row<I>(out: &mut dyn Write, cells: I) -> Result<(), IngestError>
where
    I: Iterator<Item = String>,
{
    let line = cells.collect::<Vec<_>>().join("\t");
    writeln!(out, "{line}").map_err(|err| IngestError::Filesystem(err.to_string()))
}

fn format_cell(slot: Slot<'_>) -> String {
    match slot {
        Slot::Text(value) => value.map(sanitize).unwrap_or_default(),
        Slot::List(values) => values
            .iter()
            .map(|value| sanitize(value))
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        Slot::Flag(Some(true)) => "True".to_string(),
        Slot::Flag(Some(false)) => "False".to_string(),
        Slot::Flag(None) => String::new(),
    }
}

fn sanitize(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}
