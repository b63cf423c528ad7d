use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};

use crate::config::ARCHIVE_FILE;
use crate::domain::ReleaseTag;
use crate::error::IngestError;

pub const VERSION_FILE: &str = "version.json";

#[derive(Debug, Clone)]
pub struct Store {
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, IngestError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                let root = dirs.home_dir().join(".cache").join("phenopacket-ingest");
                Utf8PathBuf::from_path_buf(root).ok()
            })
            .ok_or_else(|| {
                IngestError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { cache_root })
    }

    pub fn new_with_cache(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn cache_release_dir(&self, tag: &ReleaseTag) -> Utf8PathBuf {
        self.cache_root.join("releases").join(tag.as_str())
    }

    pub fn cache_archive_path(&self, tag: &ReleaseTag) -> Utf8PathBuf {
        self.cache_release_dir(tag).join(ARCHIVE_FILE)
    }

    pub fn cache_version_path(&self, tag: &ReleaseTag) -> Utf8PathBuf {
        self.cache_release_dir(tag).join(VERSION_FILE)
    }

    pub fn write_version(path: &Utf8Path, version: &VersionMetadata) -> Result<(), IngestError> {
        ensure_parent(path)?;
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(version)
            .map_err(|err| IngestError::Serialization(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn read_version(path: &Utf8Path) -> Option<VersionMetadata> {
        let content = fs::read_to_string(path.as_std_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IngestError> {
        let temp = temp_file_beside(dest, "phenopacket-ingest-copy")?;
        fs::copy(source.as_std_path(), temp.path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        persist(temp, dest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub release_tag: String,
    #[serde(default)]
    pub published_at: Option<String>,
    pub downloaded_at: String,
    pub source_url: String,
}

pub fn version_path_for(archive: &Utf8Path) -> Utf8PathBuf {
    match archive.parent() {
        Some(parent) => parent.join(VERSION_FILE),
        None => Utf8PathBuf::from(VERSION_FILE),
    }
}

pub fn ensure_parent(path: &Utf8Path) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| IngestError::Filesystem(format!("create {parent}: {err}")))?;
    }
    Ok(())
}

pub fn temp_file_beside(dest: &Utf8Path, prefix: &str) -> Result<NamedTempFile, IngestError> {
    ensure_parent(dest)?;
    let dir = match dest.parent().filter(|p| !p.as_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => Utf8PathBuf::from("."),
    };
    Builder::new()
        .prefix(prefix)
        .tempfile_in(dir.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))
}

pub fn persist(temp: NamedTempFile, dest: &Utf8Path) -> Result<(), IngestError> {
    temp.persist(dest.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(())
}
