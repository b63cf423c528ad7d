use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::ReleaseTag;
use crate::error::IngestError;

pub const DEFAULT_CONFIG_FILE: &str = "phenopacket-ingest.json";
pub const DEFAULT_REPO_OWNER: &str = "monarch-initiative";
pub const DEFAULT_REPO_NAME: &str = "phenopacket-store";
pub const DEFAULT_DATA_DIR: &str = "data/phenopackets";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_KGX_NAME: &str = "phenopacket_ingest";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const ARCHIVE_FILE: &str = "all_phenopackets.zip";
pub const JSONL_FILE: &str = "phenopackets.jsonl";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub transform: TransformConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub repo_owner: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub release_tag: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub jsonl: Option<String>,
    #[serde(default)]
    pub node_properties: Option<Vec<String>>,
    #[serde(default)]
    pub edge_properties: Option<Vec<String>>,
    #[serde(default)]
    pub compress: Option<bool>,
    #[serde(default)]
    pub row_limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedDownload {
    pub url: Option<String>,
    pub destination: Utf8PathBuf,
    pub repo_owner: String,
    pub repo_name: String,
    pub release_tag: Option<ReleaseTag>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedTransform {
    pub name: String,
    pub jsonl: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub node_properties: Vec<String>,
    pub edge_properties: Vec<String>,
    pub compress: bool,
    pub row_limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: Utf8PathBuf,
    pub download: ResolvedDownload,
    pub transform: ResolvedTransform,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| IngestError::ConfigParse(err.to_string()))?
        };

        Self::resolve_with_env(config, |key| std::env::var(key).ok())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        Self::resolve_with_env(config, |_| None)
    }

    pub fn resolve_with_env<E>(config: Config, env: E) -> Result<ResolvedConfig, IngestError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = Utf8PathBuf::from(
            var("PHENOPACKET_DATA_DIR")
                .or(config.data_dir)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );
        let output_dir = Utf8PathBuf::from(
            var("PHENOPACKET_OUTPUT_DIR")
                .or(config.output_dir)
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
        );

        let download = config.download;
        let release_tag = var("PHENOPACKET_RELEASE_TAG")
            .or(download.release_tag)
            .map(|tag| tag.parse::<ReleaseTag>())
            .transpose()?;
        let timeout_secs = match var("PHENOPACKET_DOWNLOAD_TIMEOUT") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                IngestError::InvalidConfig(format!("PHENOPACKET_DOWNLOAD_TIMEOUT={raw}"))
            })?,
            None => download.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        if timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "download timeout must be positive".to_string(),
            ));
        }
        if let Some(url) = &download.url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(IngestError::InvalidConfig(format!(
                    "download url must be http(s): {url}"
                )));
            }
        }

        let resolved_download = ResolvedDownload {
            url: download.url,
            destination: download
                .destination
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| data_dir.join(ARCHIVE_FILE)),
            repo_owner: var("PHENOPACKET_REPO_OWNER")
                .or(download.repo_owner)
                .unwrap_or_else(|| DEFAULT_REPO_OWNER.to_string()),
            repo_name: var("PHENOPACKET_REPO_NAME")
                .or(download.repo_name)
                .unwrap_or_else(|| DEFAULT_REPO_NAME.to_string()),
            release_tag,
            timeout: Duration::from_secs(timeout_secs),
        };

        let transform = config.transform;
        let jsonl = transform
            .jsonl
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| default_jsonl_path(&data_dir));
        let resolved_transform = ResolvedTransform {
            name: transform
                .name
                .unwrap_or_else(|| DEFAULT_KGX_NAME.to_string()),
            jsonl,
            output_dir,
            node_properties: transform
                .node_properties
                .unwrap_or_else(default_node_properties),
            edge_properties: transform
                .edge_properties
                .unwrap_or_else(default_edge_properties),
            compress: transform.compress.unwrap_or(false),
            row_limit: transform.row_limit,
        };

        Ok(ResolvedConfig {
            data_dir,
            download: resolved_download,
            transform: resolved_transform,
        })
    }
}

fn default_jsonl_path(data_dir: &Utf8Path) -> Utf8PathBuf {
    match (data_dir.parent(), data_dir.file_name()) {
        (Some(parent), Some(name)) => parent.join(format!("{name}.jsonl")),
        _ => data_dir.join(JSONL_FILE),
    }
}

pub fn default_node_properties() -> Vec<String> {
    [
        "id",
        "category",
        "name",
        "in_taxon",
        "has_biological_sex",
        "age",
        "provided_by",
        "publications",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub fn default_edge_properties() -> Vec<String> {
    [
        "id",
        "category",
        "subject",
        "predicate",
        "object",
        "negated",
        "onset_qualifier",
        "publications",
        "knowledge_level",
        "agent_type",
        "primary_knowledge_source",
        "aggregator_knowledge_source",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_without_manifest() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.data_dir, Utf8PathBuf::from("data/phenopackets"));
        assert_eq!(
            resolved.download.destination,
            Utf8PathBuf::from("data/phenopackets/all_phenopackets.zip")
        );
        assert_eq!(
            resolved.transform.jsonl,
            Utf8PathBuf::from("data/phenopackets.jsonl")
        );
        assert_eq!(resolved.transform.output_dir, Utf8PathBuf::from("output"));
        assert_eq!(resolved.download.repo_owner, DEFAULT_REPO_OWNER);
        assert_eq!(resolved.download.timeout, Duration::from_secs(30));
        assert!(resolved.download.release_tag.is_none());
    }

    #[test]
    fn env_overrides_manifest() {
        let mut config = Config::default();
        config.download.repo_owner = Some("someone".to_string());
        let resolved = ConfigLoader::resolve_with_env(config, |key| match key {
            "PHENOPACKET_REPO_OWNER" => Some("other".to_string()),
            "PHENOPACKET_RELEASE_TAG" => Some("0.1.24".to_string()),
            "PHENOPACKET_DOWNLOAD_TIMEOUT" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(resolved.download.repo_owner, "other");
        assert_eq!(
            resolved.download.release_tag.as_ref().map(|t| t.as_str()),
            Some("0.1.24")
        );
        assert_eq!(resolved.download.timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_timeout_rejected() {
        let err = ConfigLoader::resolve_with_env(Config::default(), |key| {
            (key == "PHENOPACKET_DOWNLOAD_TIMEOUT").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert_matches!(err, IngestError::InvalidConfig(_));
    }
}
