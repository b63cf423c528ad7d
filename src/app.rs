use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::info;

use crate::config::ResolvedConfig;
use crate::error::IngestError;
use crate::extract::{ExtractPolicy, ExtractSummary, extract_to_jsonl};
use crate::fs_util::validate_zip;
use crate::kgx::{KgxColumns, KgxWriter};
use crate::registry::{CUSTOM_RELEASE, ReleaseClient, ReleaseInfo, resolve_release};
use crate::store::{Store, VersionMetadata, persist, temp_file_beside, version_path_for};
use crate::transform::{TransformSummary, transform_jsonl};

#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    pub force: bool,
    pub no_cache: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub force: bool,
    pub policy: ExtractPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub output_dir: Option<Utf8PathBuf>,
    pub row_limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub download: DownloadOptions,
    pub extract: ExtractOptions,
    pub transform: TransformOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub release_tag: String,
    pub published_at: Option<String>,
    pub source_url: String,
    pub archive: String,
    pub action: String,
    pub cache_path: Option<String>,
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractResult {
    pub action: String,
    pub output: String,
    pub summary: Option<ExtractSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformResult {
    pub extract: Option<ExtractResult>,
    pub summary: TransformSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostprocessResult {
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub download: DownloadResult,
    pub extract: ExtractResult,
    pub transform: TransformResult,
    pub postprocess: PostprocessResult,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Download,
    Extract,
    Transform,
    Postprocess,
    Pipeline,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

pub struct App<C: ReleaseClient> {
    store: Store,
    client: C,
    config: ResolvedConfig,
}

impl<C: ReleaseClient> App<C> {
    pub fn new(store: Store, client: C, config: ResolvedConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn download(
        &self,
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, IngestError> {
        let download = &self.config.download;
        phase(
            sink,
            format!(
                "phase=Resolve; release of {}/{}",
                download.repo_owner, download.repo_name
            ),
        );
        let release = resolve_release(&self.client, download)?;
        info!(tag = %release.tag, url = %release.archive_url, "resolved release");

        let destination = &download.destination;
        let version_path = version_path_for(destination);
        let cacheable = release.tag.as_str() != CUSTOM_RELEASE;
        let cache_path = self.store.cache_archive_path(&release.tag);

        if !options.force && destination.as_std_path().exists() {
            let current = Store::read_version(&version_path);
            if current.is_some_and(|v| v.release_tag == release.tag.as_str()) {
                phase(sink, "phase=Store; release already present");
                return Ok(self.download_result(&release, "present", None, None));
            }
        }

        if !options.force
            && !options.no_cache
            && cacheable
            && cache_path.as_std_path().exists()
        {
            phase(sink, "phase=Store; using cached release");
            Store::copy_file_atomic(&cache_path, destination)?;
            Store::write_version(&version_path, &version_metadata(&release))?;
            return Ok(self.download_result(
                &release,
                "cache",
                Some(cache_path.to_string()),
                None,
            ));
        }

        phase(sink, format!("phase=Download; {}", release.archive_url));
        let start = Instant::now();
        let temp = temp_file_beside(destination, ".all_phenopackets")?;
        let bytes = self.client.download(&release.archive_url, temp.path())?;
        sink.event(ProgressEvent {
            message: format!("download.complete bytes={bytes}"),
            elapsed: Some(start.elapsed()),
        });

        phase(sink, "phase=Verify; validating archive");
        validate_zip(temp.path())?;

        phase(sink, "phase=Store; writing archive");
        persist(temp, destination)?;
        let version = version_metadata(&release);
        Store::write_version(&version_path, &version)?;

        let cached = if !options.no_cache && cacheable {
            Store::copy_file_atomic(destination, &cache_path)?;
            Store::write_version(&self.store.cache_version_path(&release.tag), &version)?;
            Some(cache_path.to_string())
        } else {
            None
        };
        info!(bytes, archive = %destination, "release downloaded");

        Ok(self.download_result(&release, "download", cached, Some(bytes)))
    }

    pub fn extract(
        &self,
        options: ExtractOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ExtractResult, IngestError> {
        let archive = &self.config.download.destination;
        let output = &self.config.transform.jsonl;

        if !options.force && output.as_std_path().exists() {
            phase(sink, format!("phase=Store; {output} already present"));
            info!(output = %output, "JSONL already present, skipping extraction");
            return Ok(ExtractResult {
                action: "present".to_string(),
                output: output.to_string(),
                summary: None,
            });
        }

        phase(sink, format!("phase=Extract; reading {archive}"));
        let summary = extract_to_jsonl(archive, output, options.policy, |done, total| {
            phase(sink, format!("phase=Extract; entry {done}/{total}"));
        })?;
        Ok(ExtractResult {
            action: "extract".to_string(),
            output: output.to_string(),
            summary: Some(summary),
        })
    }

    pub fn transform(
        &self,
        options: TransformOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TransformResult, IngestError> {
        let transform = &self.config.transform;
        let columns = KgxColumns::new(
            transform.node_properties.clone(),
            transform.edge_properties.clone(),
        )?;

        let extract = if transform.jsonl.as_std_path().exists() {
            None
        } else {
            Some(self.extract(ExtractOptions::default(), sink)?)
        };

        let output_dir = options
            .output_dir
            .unwrap_or_else(|| transform.output_dir.clone());
        let row_limit = options.row_limit.or(transform.row_limit);

        phase(sink, format!("phase=Transform; writing KGX to {output_dir}"));
        let start = Instant::now();
        let writer = KgxWriter::create(&output_dir, &transform.name, transform.compress, columns)?;
        let summary = transform_jsonl(&transform.jsonl, writer, row_limit, |records| {
            phase(sink, format!("phase=Transform; records {records}"));
        })?;
        sink.event(ProgressEvent {
            message: format!(
                "transform.complete nodes={} edges={}",
                summary.nodes, summary.edges
            ),
            elapsed: Some(start.elapsed()),
        });

        Ok(TransformResult { extract, summary })
    }

    pub fn postprocess(&self, sink: &dyn ProgressSink) -> Result<PostprocessResult, IngestError> {
        phase(sink, "phase=Postprocess; nothing to do");
        Ok(PostprocessResult {
            action: "noop".to_string(),
        })
    }

    pub fn pipeline(
        &self,
        options: PipelineOptions,
        sink: &dyn ProgressSink,
    ) -> Result<PipelineResult, IngestError> {
        let download = self.download(options.download, sink)?;
        let mut extract_options = options.extract;
        extract_options.force |= download.action != "present";
        let extract = self.extract(extract_options, sink)?;
        let transform = self.transform(options.transform, sink)?;
        let postprocess = self.postprocess(sink)?;
        phase(sink, "phase=Done; pipeline complete");
        Ok(PipelineResult {
            download,
            extract,
            transform,
            postprocess,
        })
    }

    fn download_result(
        &self,
        release: &ReleaseInfo,
        action: &str,
        cache_path: Option<String>,
        bytes: Option<u64>,
    ) -> DownloadResult {
        DownloadResult {
            release_tag: release.tag.to_string(),
            published_at: release.published_at.clone(),
            source_url: release.archive_url.clone(),
            archive: self.config.download.destination.to_string(),
            action: action.to_string(),
            cache_path,
            bytes,
        }
    }
}

fn version_metadata(release: &ReleaseInfo) -> VersionMetadata {
    VersionMetadata {
        release_tag: release.tag.to_string(),
        published_at: release.published_at.clone(),
        downloaded_at: chrono::Utc::now().to_rfc3339(),
        source_url: release.archive_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;

    use serde_json::json;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::config::{Config, ConfigLoader};
    use crate::output::JsonOutput;
    use crate::registry::GithubRelease;

    struct MockClient {
        downloads: Mutex<usize>,
    }

    impl ReleaseClient for MockClient {
        fn latest_release(&self, _owner: &str, _repo: &str) -> Result<GithubRelease, IngestError> {
            Ok(GithubRelease {
                tag_name: "0.1.24".to_string(),
                published_at: None,
                html_url: None,
            })
        }

        fn list_tags(&self, _owner: &str, _repo: &str) -> Result<Vec<String>, IngestError> {
            Ok(Vec::new())
        }

        fn download(&self, _url: &str, destination: &Path) -> Result<u64, IngestError> {
            *self.downloads.lock().unwrap() += 1;
            let mut writer = zip::ZipWriter::new(std::fs::File::create(destination).unwrap());
            writer
                .start_file("0.1.24/POGZ/PMID_34133408_case.json", SimpleFileOptions::default())
                .unwrap();
            let packet = json!({
                "id": "PMID_34133408_case",
                "phenotypicFeatures": [{"type": {"id": "HP:0001263"}}],
                "diseases": [{"term": {"id": "MONDO:0007739"}}]
            });
            writer.write_all(packet.to_string().as_bytes()).unwrap();
            writer.finish().unwrap();
            Ok(std::fs::metadata(destination).unwrap().len())
        }
    }

    fn app(root: &camino::Utf8Path) -> App<MockClient> {
        let config = Config {
            data_dir: Some(root.join("data/phenopackets").to_string()),
            output_dir: Some(root.join("output").to_string()),
            ..Default::default()
        };
        let config = ConfigLoader::resolve_config(config).unwrap();
        let store = Store::new_with_cache(root.join("cache"));
        App::new(
            store,
            MockClient {
                downloads: Mutex::new(0),
            },
            config,
        )
    }

    #[test]
    fn download_prefers_present_then_cache() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let app = app(&root);

        let first = app.download(DownloadOptions::default(), &JsonOutput).unwrap();
        assert_eq!(first.action, "download");
        let second = app.download(DownloadOptions::default(), &JsonOutput).unwrap();
        assert_eq!(second.action, "present");

        std::fs::remove_file(app.config().download.destination.as_std_path()).unwrap();
        let third = app.download(DownloadOptions::default(), &JsonOutput).unwrap();
        assert_eq!(third.action, "cache");
        assert_eq!(*app.client.downloads.lock().unwrap(), 1);
    }

    #[test]
    fn pipeline_end_to_end() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let app = app(&root);

        let result = app.pipeline(PipelineOptions::default(), &JsonOutput).unwrap();
        assert_eq!(result.extract.action, "extract");
        assert_eq!(result.transform.summary.records, 1);
        assert_eq!(result.transform.summary.phenotype_edges, 1);
        assert_eq!(result.transform.summary.disease_edges, 1);
        assert_eq!(result.transform.summary.gene_edges, 0);
        assert_eq!(result.postprocess.action, "noop");

        let nodes =
            std::fs::read_to_string(root.join("output/phenopacket_ingest_nodes.tsv")).unwrap();
        assert!(nodes.contains("phenopacket.store:POGZ.PMID_34133408_case"));
    }

    #[test]
    fn transform_without_inputs_reports_missing_archive() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let app = app(&root);
        let err = app
            .transform(TransformOptions::default(), &JsonOutput)
            .unwrap_err();
        assert!(matches!(err, IngestError::ArchiveNotFound(_)));
    }
}
