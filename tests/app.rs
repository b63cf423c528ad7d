use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::json;
use zip::write::SimpleFileOptions;

use phenopacket_ingest::app::{
    App, DownloadOptions, ExtractOptions, PipelineOptions, TransformOptions,
};
use phenopacket_ingest::config::{Config, ConfigLoader, DownloadConfig};
use phenopacket_ingest::error::IngestError;
use phenopacket_ingest::output::JsonOutput;
use phenopacket_ingest::registry::{GithubRelease, ReleaseClient};
use phenopacket_ingest::store::Store;

#[derive(Default)]
struct MockGithub {
    latest_fails: bool,
    tags: Vec<String>,
    urls: Mutex<Vec<String>>,
}

impl ReleaseClient for MockGithub {
    fn latest_release(&self, _owner: &str, _repo: &str) -> Result<GithubRelease, IngestError> {
        if self.latest_fails {
            return Err(IngestError::GithubStatus {
                status: 404,
                message: "Not Found".to_string(),
            });
        }
        Ok(GithubRelease {
            tag_name: "0.1.24".to_string(),
            published_at: Some("2025-01-10T12:00:00Z".to_string()),
            html_url: None,
        })
    }

    fn list_tags(&self, _owner: &str, _repo: &str) -> Result<Vec<String>, IngestError> {
        Ok(self.tags.clone())
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, IngestError> {
        self.urls.lock().unwrap().push(url.to_string());
        let mut writer = zip::ZipWriter::new(std::fs::File::create(destination).unwrap());
        for (name, id, symbol, hgnc) in [
            ("POGZ/PMID_34133408_case.json", "PMID_34133408_case", "POGZ", "HGNC:18801"),
            ("FBN1/PMID_1_p1.json", "PMID_1_p1", "FBN1", "HGNC:3603"),
        ] {
            writer
                .start_file(format!("0.1.24/{name}"), SimpleFileOptions::default())
                .unwrap();
            let packet = json!({
                "id": id,
                "subject": {"id": "p", "sex": "FEMALE"},
                "phenotypicFeatures": [{"type": {"id": "HP:0001263"}}],
                "interpretations": [{
                    "id": "i1",
                    "diagnosis": {
                        "disease": {"id": "OMIM:1"},
                        "genomicInterpretations": [{
                            "subjectOrBiosampleId": "p",
                            "interpretationStatus": "CAUSATIVE",
                            "variantInterpretation": {
                                "variationDescriptor": {
                                    "id": "v1",
                                    "geneContext": {"valueId": hgnc, "symbol": symbol}
                                }
                            }
                        }]
                    }
                }]
            });
            writer.write_all(packet.to_string().as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        Ok(std::fs::metadata(destination).unwrap().len())
    }
}

fn app_with(root: &Utf8Path, client: MockGithub, download: DownloadConfig) -> App<MockGithub> {
    let config = Config {
        data_dir: Some(root.join("data/phenopackets").to_string()),
        output_dir: Some(root.join("output").to_string()),
        download,
        ..Default::default()
    };
    let config = ConfigLoader::resolve_config(config).unwrap();
    App::new(Store::new_with_cache(root.join("cache")), client, config)
}

fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn pipeline_produces_cases_and_gene_edges() {
    let (_temp, root) = scratch();
    let app = app_with(&root, MockGithub::default(), DownloadConfig::default());

    let result = app.pipeline(PipelineOptions::default(), &JsonOutput).unwrap();
    assert_eq!(result.download.release_tag, "0.1.24");
    assert_eq!(result.download.action, "download");
    assert_eq!(
        result.download.source_url,
        concat!(
            "https://github.com/monarch-initiative/phenopacket-store",
            "/releases/download/0.1.24/all_phenopackets.zip"
        )
    );
    assert_eq!(result.transform.summary.records, 2);
    assert_eq!(result.transform.summary.nodes, 2);
    assert_eq!(result.transform.summary.gene_edges, 2);
    assert_eq!(result.transform.summary.phenotype_edges, 2);

    let version = Store::read_version(&root.join("data/phenopackets/version.json")).unwrap();
    assert_eq!(version.release_tag, "0.1.24");

    let edges = std::fs::read_to_string(root.join("output/phenopacket_ingest_edges.tsv")).unwrap();
    assert!(edges.contains("biolink:has_gene"));
    assert!(edges.contains("phenopacket.store:FBN1.PMID_1_p1"));
}

#[test]
fn rerun_reuses_present_archive_and_jsonl() {
    let (_temp, root) = scratch();
    let app = app_with(&root, MockGithub::default(), DownloadConfig::default());
    app.pipeline(PipelineOptions::default(), &JsonOutput).unwrap();

    let second = app.pipeline(PipelineOptions::default(), &JsonOutput).unwrap();
    assert_eq!(second.download.action, "present");
    assert_eq!(second.extract.action, "present");
    assert_eq!(second.transform.summary.records, 2);
}

#[test]
fn cached_release_serves_a_fresh_destination() {
    let (_temp, root) = scratch();
    let first = app_with(&root, MockGithub::default(), DownloadConfig::default());
    first.download(DownloadOptions::default(), &JsonOutput).unwrap();

    let other = root.join("elsewhere/pp.zip");
    let second = app_with(
        &root,
        MockGithub::default(),
        DownloadConfig {
            destination: Some(other.to_string()),
            ..Default::default()
        },
    );
    let result = second.download(DownloadOptions::default(), &JsonOutput).unwrap();
    assert_eq!(result.action, "cache");
    assert!(other.as_std_path().exists());

    let forced = second
        .download(
            DownloadOptions {
                force: true,
                no_cache: false,
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(forced.action, "download");
}

#[test]
fn tag_listing_fallback_picks_highest_version() {
    let (_temp, root) = scratch();
    let client = MockGithub {
        latest_fails: true,
        tags: vec!["0.1.9".to_string(), "0.1.23".to_string(), "draft".to_string()],
        ..Default::default()
    };
    let app = app_with(&root, client, DownloadConfig::default());
    let result = app.download(DownloadOptions::default(), &JsonOutput).unwrap();
    assert_eq!(result.release_tag, "0.1.23");
    assert!(result.source_url.contains("/download/0.1.23/"));
}

#[test]
fn release_resolution_fails_without_tags() {
    let (_temp, root) = scratch();
    let client = MockGithub {
        latest_fails: true,
        ..Default::default()
    };
    let app = app_with(&root, client, DownloadConfig::default());
    let err = app
        .download(DownloadOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, IngestError::ReleaseResolution(_));
}

#[test]
fn fixed_url_is_fetched_without_cache() {
    let (_temp, root) = scratch();
    let url = "https://mirror.example.org/all_phenopackets.zip";
    let app = app_with(
        &root,
        MockGithub::default(),
        DownloadConfig {
            url: Some(url.to_string()),
            ..Default::default()
        },
    );
    let result = app.download(DownloadOptions::default(), &JsonOutput).unwrap();
    assert_eq!(result.release_tag, "custom");
    assert_eq!(result.source_url, url);
    assert!(result.cache_path.is_none());
    assert!(!root.join("cache/releases/custom").as_std_path().exists());
}

#[test]
fn extract_and_transform_without_archive() {
    let (_temp, root) = scratch();
    let app = app_with(&root, MockGithub::default(), DownloadConfig::default());
    assert_matches!(
        app.extract(ExtractOptions::default(), &JsonOutput),
        Err(IngestError::ArchiveNotFound(_))
    );
    assert_matches!(
        app.transform(TransformOptions::default(), &JsonOutput),
        Err(IngestError::ArchiveNotFound(_))
    );
}

#[test]
fn transform_row_limit_and_output_override() {
    let (_temp, root) = scratch();
    let app = app_with(&root, MockGithub::default(), DownloadConfig::default());
    app.download(DownloadOptions::default(), &JsonOutput).unwrap();

    let out = root.join("custom-out");
    let result = app
        .transform(
            TransformOptions {
                output_dir: Some(out.clone()),
                row_limit: Some(1),
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(result.extract.unwrap().action, "extract");
    assert_eq!(result.summary.records, 1);
    assert!(out.join("phenopacket_ingest_nodes.tsv").as_std_path().exists());
}
