use std::fs;
use std::io;
use std::path::{Component, Path};

use zip::ZipArchive;

use crate::domain::Cohort;
use crate::error::IngestError;

pub fn open_zip(zip_path: &Path) -> Result<ZipArchive<fs::File>, IngestError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            IngestError::ArchiveNotFound(zip_path.display().to_string())
        } else {
            IngestError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
        }
    })?;
    ZipArchive::new(file).map_err(|err| IngestError::InvalidArchive {
        path: zip_path.display().to_string(),
        message: err.to_string(),
    })
}

pub fn validate_zip(zip_path: &Path) -> Result<(), IngestError> {
    let mut archive = open_zip(zip_path)?;
    let invalid = |message: String| IngestError::InvalidArchive {
        path: zip_path.display().to_string(),
        message,
    };

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| invalid(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink()).map_err(|err| invalid(err.to_string()))?;
    }
    Ok(())
}

pub fn is_phenopacket_entry(name: &str) -> bool {
    !name.ends_with('/')
        && name.to_ascii_lowercase().ends_with(".json")
        && !name.starts_with("__MACOSX")
        && !name.contains("/__MACOSX/")
}

pub fn cohort_of(entry: &Path) -> Cohort {
    let mut dirs = entry
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        });
    dirs.next_back()
        .and_then(|name| name.parse().ok())
        .unwrap_or_else(Cohort::unknown)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    #[test]
    fn entry_filter() {
        assert!(is_phenopacket_entry("0.1.24/POGZ/PMID_1.json"));
        assert!(!is_phenopacket_entry("__MACOSX/0.1.24/._PMID_1.json"));
        assert!(!is_phenopacket_entry("0.1.24/POGZ/"));
        assert!(!is_phenopacket_entry("0.1.24/README.md"));
    }

    #[test]
    fn cohort_is_parent_directory() {
        assert_eq!(
            cohort_of(Path::new("0.1.24/POGZ/PMID_1_case.json")).as_str(),
            "POGZ"
        );
        assert_eq!(cohort_of(Path::new("case.json")), Cohort::unknown());
    }

    #[test]
    fn validate_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.zip");
        fs::write(&path, b"not a zip").unwrap();
        assert_matches!(
            validate_zip(&path).unwrap_err(),
            IngestError::InvalidArchive { .. }
        );
        assert_matches!(
            validate_zip(&dir.path().join("missing.zip")).unwrap_err(),
            IngestError::ArchiveNotFound(_)
        );
    }

    #[test]
    fn validate_accepts_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.zip");
        let mut writer = zip::ZipWriter::new(fs::File::create(&path).unwrap());
        writer
            .start_file("a/b.json", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"{}").unwrap();
        writer.finish().unwrap();
        validate_zip(&path).unwrap();
    }
}
