use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("invalid release tag: {0}")]
    InvalidReleaseTag(String),

    #[error("invalid cohort name: {0:?}")]
    InvalidCohort(String),

    #[error("invalid phenopacket id: {0:?}")]
    InvalidPhenopacketId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("GitHub request failed: {0}")]
    GithubHttp(String),

    #[error("GitHub returned status {status}: {message}")]
    GithubStatus { status: u16, message: String },

    #[error("{0}")]
    ReleaseResolution(String),

    #[error("download failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("archive not found at {0} (run `download` first)")]
    #[diagnostic(help("run `phenopacket-ingest download` to fetch the release archive"))]
    ArchiveNotFound(String),

    #[error("invalid archive {path}: {message}")]
    InvalidArchive { path: String, message: String },

    #[error("no phenopacket entries found in {0}")]
    EmptyArchive(String),

    #[error("invalid phenopacket entry {entry}: {message}")]
    InvalidPhenopacket { entry: String, message: String },

    #[error("JSONL file not found at {0}")]
    JsonlNotFound(String),

    #[error("malformed record at {path}:{line}: {message}")]
    MalformedRecord {
        path: String,
        line: usize,
        message: String,
    },

    #[error("unknown {kind} column in transform manifest: {column}")]
    UnknownColumn { kind: &'static str, column: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
