use std::collections::BTreeSet;
use std::io::{BufWriter, Read, Write};

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::Cohort;
use crate::error::IngestError;
use crate::fs_util::{cohort_of, is_phenopacket_entry, open_zip};
use crate::phenopacket::Phenopacket;
use crate::record::PhenopacketRecord;
use crate::store::{persist, temp_file_beside};

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractPolicy {
    #[default]
    Skip,
    Abort,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub archive: String,
    pub output: String,
    pub entries: usize,
    pub written: usize,
    pub skipped: usize,
    pub cohorts: usize,
}

pub fn extract_to_jsonl<F>(
    archive_path: &Utf8Path,
    output_path: &Utf8Path,
    policy: ExtractPolicy,
    mut progress: F,
) -> Result<ExtractSummary, IngestError>
where
    F: FnMut(usize, usize),
{
    let mut archive = open_zip(archive_path.as_std_path())?;
    let invalid_archive = |message: String| IngestError::InvalidArchive {
        path: archive_path.to_string(),
        message,
    };

    let mut indices = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|err| invalid_archive(err.to_string()))?;
        if !entry.is_dir() && is_phenopacket_entry(entry.name()) {
            indices.push(i);
        }
    }
    let total = indices.len();
    if total == 0 {
        return Err(IngestError::EmptyArchive(archive_path.to_string()));
    }
    info!(entries = total, archive = %archive_path, "extracting phenopackets");

    let temp = temp_file_beside(output_path, ".phenopackets-jsonl")?;
    let mut writer = BufWriter::new(temp);
    let mut written = 0usize;
    let mut skipped = 0usize;
    let mut cohorts = BTreeSet::new();

    for (n, index) in indices.into_iter().enumerate() {
        if n % PROGRESS_EVERY == 0 {
            info!("processing entry {}/{}", n + 1, total);
            progress(n, total);
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|err| invalid_archive(err.to_string()))?;
        let name = entry.name().to_string();

        let decoded = match entry.enclosed_name() {
            Some(path) => {
                let mut text = String::new();
                entry
                    .read_to_string(&mut text)
                    .map_err(|err| err.to_string())
                    .and_then(|_| decode_entry(&text, cohort_of(&path)))
            }
            None => Err("entry path escapes the archive root".to_string()),
        };

        match decoded {
            Ok(record) => {
                let line = record
                    .to_json_line()
                    .map_err(|err| IngestError::Serialization(err.to_string()))?;
                writeln!(writer, "{line}")
                    .map_err(|err| IngestError::Filesystem(err.to_string()))?;
                cohorts.insert(record.cohort);
                written += 1;
            }
            Err(message) => match policy {
                ExtractPolicy::Skip => {
                    warn!(entry = %name, "skipping entry: {message}");
                    skipped += 1;
                }
                ExtractPolicy::Abort => {
                    return Err(IngestError::InvalidPhenopacket {
                        entry: name,
                        message,
                    });
                }
            },
        }
    }
    progress(total, total);

    let temp = writer
        .into_inner()
        .map_err(|err| IngestError::Filesystem(err.error().to_string()))?;
    persist(temp, output_path)?;

    info!(written, skipped, output = %output_path, "extraction complete");
    Ok(ExtractSummary {
        archive: archive_path.to_string(),
        output: output_path.to_string(),
        entries: total,
        written,
        skipped,
        cohorts: cohorts.len(),
    })
}

fn decode_entry(text: &str, cohort: Cohort) -> Result<PhenopacketRecord, String> {
    let packet = Phenopacket::from_json(text).map_err(|err| err.to_string())?;
    packet.validate()?;
    Ok(PhenopacketRecord::from_phenopacket(packet, &cohort))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;
    use serde_json::json;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Utf8Path, entries: &[(&str, String)]) {
        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn packet(id: &str) -> String {
        json!({"id": id, "subject": {"id": "s", "sex": "FEMALE"}}).to_string()
    }

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    #[test]
    fn one_line_per_entry_with_parent_cohort() {
        let (_dir, root) = scratch();
        let zip_path = root.join("pp.zip");
        write_zip(
            &zip_path,
            &[
                ("0.1.24/POGZ/a.json", packet("a")),
                ("0.1.24/POGZ/b.json", packet("b")),
                ("0.1.24/SCN2A/c.json", packet("c")),
                ("__MACOSX/0.1.24/POGZ/._a.json", "junk".to_string()),
                ("0.1.24/README.md", "readme".to_string()),
            ],
        );
        let out = root.join("out/pp.jsonl");
        let summary = extract_to_jsonl(&zip_path, &out, ExtractPolicy::Skip, |_, _| {}).unwrap();
        assert_eq!(summary.entries, 3);
        assert_eq!(summary.written, 3);
        assert_eq!(summary.cohorts, 2);

        let lines: Vec<PhenopacketRecord> = fs::read_to_string(&out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].cohort, "POGZ");
        assert_eq!(lines[2].cohort, "SCN2A");
    }

    #[test]
    fn bad_entries_follow_policy() {
        let (_dir, root) = scratch();
        let zip_path = root.join("pp.zip");
        write_zip(
            &zip_path,
            &[
                ("X/good.json", packet("good")),
                ("X/broken.json", "{not json".to_string()),
                ("X/noid.json", json!({"subject": {}}).to_string()),
            ],
        );
        let out = root.join("pp.jsonl");
        let summary = extract_to_jsonl(&zip_path, &out, ExtractPolicy::Skip, |_, _| {}).unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 2);

        let err =
            extract_to_jsonl(&zip_path, &out, ExtractPolicy::Abort, |_, _| {}).unwrap_err();
        assert_matches!(err, IngestError::InvalidPhenopacket { .. });
    }

    #[test]
    fn rerun_truncates_previous_output() {
        let (_dir, root) = scratch();
        let zip_path = root.join("pp.zip");
        write_zip(&zip_path, &[("X/a.json", packet("a"))]);
        let out = root.join("pp.jsonl");
        fs::write(&out, "stale\nstale\nstale\n").unwrap();
        extract_to_jsonl(&zip_path, &out, ExtractPolicy::Skip, |_, _| {}).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap().lines().count(), 1);
    }

    #[test]
    fn empty_and_missing_archives() {
        let (_dir, root) = scratch();
        let zip_path = root.join("empty.zip");
        write_zip(&zip_path, &[("notes.txt", "x".to_string())]);
        let out = root.join("pp.jsonl");
        assert_matches!(
            extract_to_jsonl(&zip_path, &out, ExtractPolicy::Skip, |_, _| {}).unwrap_err(),
            IngestError::EmptyArchive(_)
        );
        assert_matches!(
            extract_to_jsonl(&root.join("nope.zip"), &out, ExtractPolicy::Skip, |_, _| {})
                .unwrap_err(),
            IngestError::ArchiveNotFound(_)
        );
    }
}
