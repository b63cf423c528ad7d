use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ARCHIVE_FILE, ResolvedDownload};
use crate::domain::ReleaseTag;
use crate::error::IngestError;

pub const GITHUB_API: &str = "https://api.github.com";
pub const CUSTOM_RELEASE: &str = "custom";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubTag {
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub tag: ReleaseTag,
    pub published_at: Option<String>,
    pub html_url: Option<String>,
    pub archive_url: String,
}

pub trait ReleaseClient: Send + Sync {
    fn latest_release(&self, owner: &str, repo: &str) -> Result<GithubRelease, IngestError>;
    fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>, IngestError>;
    fn download(&self, url: &str, destination: &Path) -> Result<u64, IngestError>;
}

pub fn archive_url(owner: &str, repo: &str, tag: &ReleaseTag) -> String {
    format!(
        "https://github.com/{owner}/{repo}/releases/download/{}/{ARCHIVE_FILE}",
        tag.as_str()
    )
}

pub fn resolve_release<C: ReleaseClient + ?Sized>(
    client: &C,
    download: &ResolvedDownload,
) -> Result<ReleaseInfo, IngestError> {
    let owner = download.repo_owner.as_str();
    let repo = download.repo_name.as_str();

    if let Some(url) = &download.url {
        let tag = match &download.release_tag {
            Some(tag) => tag.clone(),
            None => CUSTOM_RELEASE.parse()?,
        };
        return Ok(ReleaseInfo {
            tag,
            published_at: None,
            html_url: None,
            archive_url: url.clone(),
        });
    }

    if let Some(tag) = &download.release_tag {
        return Ok(ReleaseInfo {
            tag: tag.clone(),
            published_at: None,
            html_url: None,
            archive_url: archive_url(owner, repo, tag),
        });
    }

    match client.latest_release(owner, repo) {
        Ok(release) => {
            let tag: ReleaseTag = release.tag_name.parse()?;
            Ok(ReleaseInfo {
                archive_url: archive_url(owner, repo, &tag),
                tag,
                published_at: release.published_at,
                html_url: release.html_url,
            })
        }
        Err(err) => {
            warn!("latest release lookup failed ({err}); falling back to tag listing");
            let tags = client.list_tags(owner, repo)?;
            if tags.is_empty() {
                return Err(IngestError::ReleaseResolution(format!(
                    "no tags found for {owner}/{repo}"
                )));
            }
            let tag = ReleaseTag::latest(tags.iter().map(String::as_str)).ok_or_else(|| {
                IngestError::ReleaseResolution(format!(
                    "no version-like tag among {} tags of {owner}/{repo}",
                    tags.len()
                ))
            })?;
            Ok(ReleaseInfo {
                archive_url: archive_url(owner, repo, &tag),
                tag,
                published_at: None,
                html_url: None,
            })
        }
    }
}

#[derive(Clone)]
pub struct GithubHttpClient {
    client: Client,
    api_base: String,
}

impl GithubHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("phenopacket-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::GithubHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                        .map_err(|err| IngestError::GithubHttp(err.to_string()))?,
                );
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| IngestError::GithubHttp(err.to_string()))?;

        Ok(Self {
            client,
            api_base: GITHUB_API.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, IngestError> {
        debug!(url, "GitHub API request");
        let response = self
            .send_with_retries(|| self.client.get(url))
            .map_err(IngestError::GithubHttp)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GitHub request failed".to_string());
            return Err(IngestError::GithubStatus { status, message });
        }
        response
            .json::<T>()
            .map_err(|err| IngestError::GithubHttp(err.to_string()))
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, String>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        debug!(status, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        debug!(error = %err, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(err.to_string());
                }
            }
        }
    }
}

impl ReleaseClient for GithubHttpClient {
    fn latest_release(&self, owner: &str, repo: &str) -> Result<GithubRelease, IngestError> {
        let url = format!("{}/repos/{owner}/{repo}/releases/latest", self.api_base);
        self.get_json(&url)
    }

    fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<String>, IngestError> {
        let url = format!("{}/repos/{owner}/{repo}/tags?per_page=100", self.api_base);
        let tags: Vec<GithubTag> = self.get_json(&url)?;
        Ok(tags.into_iter().map(|tag| tag.name).collect())
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, IngestError> {
        debug!(url, "downloading archive");
        let mut response = self
            .send_with_retries(|| self.client.get(url).timeout(Duration::from_secs(60 * 30)))
            .map_err(IngestError::DownloadHttp)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "archive download failed".to_string());
            return Err(IngestError::DownloadStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| IngestError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| IngestError::DownloadHttp(err.to_string()))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    struct MockClient {
        latest: Option<&'static str>,
        tags: Vec<&'static str>,
    }

    impl ReleaseClient for MockClient {
        fn latest_release(&self, _owner: &str, _repo: &str) -> Result<GithubRelease, IngestError> {
            match self.latest {
                Some(tag) => Ok(GithubRelease {
                    tag_name: tag.to_string(),
                    published_at: Some("2024-05-01T00:00:00Z".to_string()),
                    html_url: None,
                }),
                None => Err(IngestError::GithubStatus {
                    status: 404,
                    message: "Not Found".to_string(),
                }),
            }
        }

        fn list_tags(&self, _owner: &str, _repo: &str) -> Result<Vec<String>, IngestError> {
            Ok(self.tags.iter().map(|t| t.to_string()).collect())
        }

        fn download(&self, _url: &str, _destination: &Path) -> Result<u64, IngestError> {
            Ok(0)
        }
    }

    fn download_config() -> ResolvedDownload {
        ResolvedDownload {
            url: None,
            destination: Utf8PathBuf::from("data/all_phenopackets.zip"),
            repo_owner: "monarch-initiative".to_string(),
            repo_name: "phenopacket-store".to_string(),
            release_tag: None,
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn latest_release_builds_archive_url() {
        let client = MockClient {
            latest: Some("0.1.24"),
            tags: vec![],
        };
        let info = resolve_release(&client, &download_config()).unwrap();
        assert_eq!(info.tag.as_str(), "0.1.24");
        assert_eq!(
            info.archive_url,
            concat!(
                "https://github.com/monarch-initiative/phenopacket-store",
                "/releases/download/0.1.24/all_phenopackets.zip"
            )
        );
        assert!(info.published_at.is_some());
    }

    #[test]
    fn falls_back_to_highest_tag() {
        let client = MockClient {
            latest: None,
            tags: vec!["0.1.9", "0.1.11", "0.1.10", "draft"],
        };
        let info = resolve_release(&client, &download_config()).unwrap();
        assert_eq!(info.tag.as_str(), "0.1.11");
    }

    #[test]
    fn no_tags_is_an_error() {
        let client = MockClient {
            latest: None,
            tags: vec![],
        };
        let err = resolve_release(&client, &download_config()).unwrap_err();
        assert_matches!(err, IngestError::ReleaseResolution(_));
    }

    #[test]
    fn fixed_url_skips_lookup() {
        let client = MockClient {
            latest: None,
            tags: vec![],
        };
        let mut download = download_config();
        download.url = Some("https://example.org/pp.zip".to_string());
        let info = resolve_release(&client, &download).unwrap();
        assert_eq!(info.tag.as_str(), CUSTOM_RELEASE);
        assert_eq!(info.archive_url, "https://example.org/pp.zip");
    }

    #[test]
    fn pinned_tag_skips_lookup() {
        let client = MockClient {
            latest: Some("9.9.9"),
            tags: vec![],
        };
        let mut download = download_config();
        download.release_tag = Some("0.1.20".parse().unwrap());
        let info = resolve_release(&client, &download).unwrap();
        assert_eq!(info.tag.as_str(), "0.1.20");
    }
}
