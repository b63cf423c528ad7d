use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::IngestError;

pub const CASE_NAMESPACE: &str = "phenopacket.store";
pub const UNKNOWN_COHORT: &str = "unknown";

static SEMVER_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?(?P<major>\d+)(\.(?P<minor>\d+))?(\.(?P<patch>\d+))?").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cohort(String);

impl Cohort {
    pub fn unknown() -> Self {
        Self(UNKNOWN_COHORT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cohort {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() || value.contains('/') || value.contains('\\') {
            return Err(IngestError::InvalidCohort(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

// `.`, `%` and whitespace in the cohort are percent-encoded; the id is verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(cohort: &Cohort, phenopacket_id: &str) -> Result<Self, IngestError> {
        if !is_valid_phenopacket_id(phenopacket_id) {
            return Err(IngestError::InvalidPhenopacketId(phenopacket_id.to_string()));
        }
        Ok(Self(format!(
            "{CASE_NAMESPACE}:{}.{phenopacket_id}",
            escape_cohort(cohort.as_str())
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn is_valid_phenopacket_id(id: &str) -> bool {
    !id.is_empty() && id.trim() == id
}

fn escape_cohort(cohort: &str) -> String {
    let mut out = String::with_capacity(cohort.len());
    for ch in cohort.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '.' => out.push_str("%2E"),
            ws if ws.is_ascii_whitespace() => out.push_str(&format!("%{:02X}", ws as u32)),
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReleaseTag(String);

impl ReleaseTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn version(&self) -> Option<(u64, u64, u64)> {
        let captures = SEMVER_TAG.captures(&self.0)?;
        let part = |name: &str| {
            captures
                .name(name)
                .and_then(|m| m.as_str().parse::<u64>().ok())
        };
        Some((part("major")?, part("minor").unwrap_or(0), part("patch").unwrap_or(0)))
    }

    pub fn latest<'a, I>(tags: I) -> Option<ReleaseTag>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<((u64, u64, u64), ReleaseTag)> = None;
        for raw in tags {
            let Ok(tag) = raw.parse::<ReleaseTag>() else {
                continue;
            };
            let Some(version) = tag.version() else {
                continue;
            };
            match &best {
                Some((current, _)) if version <= *current => {}
                _ => best = Some((version, tag)),
            }
        }
        best.map(|(_, tag)| tag)
    }
}

impl fmt::Display for ReleaseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReleaseTag {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_' | '+'));
        if !is_valid {
            return Err(IngestError::InvalidReleaseTag(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sex {
    Unknown,
    Female,
    Male,
    Other,
}

impl Sex {
    pub fn from_proto(value: &Value) -> Sex {
        let raw = match value {
            Value::String(s) => s.trim().to_ascii_uppercase(),
            Value::Number(n) => n.to_string(),
            _ => return Sex::Unknown,
        };
        match raw.as_str() {
            "1" | "FEMALE" => Sex::Female,
            "2" | "MALE" => Sex::Male,
            "3" | "OTHER" | "OTHER_SEX" => Sex::Other,
            _ => Sex::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Sex::Unknown => "UNKNOWN",
            Sex::Female => "FEMALE",
            Sex::Male => "MALE",
            Sex::Other => "OTHER",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl<'de> Deserialize<'de> for Sex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Sex::from_proto(&value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterpretationStatus {
    UnknownStatus,
    Rejected,
    Candidate,
    Contributory,
    Causative,
}

impl InterpretationStatus {
    pub fn from_proto(value: &Value) -> InterpretationStatus {
        let raw = match value {
            Value::String(s) => s.trim().to_ascii_uppercase(),
            Value::Number(n) => n.to_string(),
            _ => return InterpretationStatus::UnknownStatus,
        };
        match raw.as_str() {
            "1" | "REJECTED" => InterpretationStatus::Rejected,
            "2" | "CANDIDATE" => InterpretationStatus::Candidate,
            "3" | "CONTRIBUTORY" => InterpretationStatus::Contributory,
            "4" | "CAUSATIVE" => InterpretationStatus::Causative,
            _ => InterpretationStatus::UnknownStatus,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InterpretationStatus::UnknownStatus => "UNKNOWN_STATUS",
            InterpretationStatus::Rejected => "REJECTED",
            InterpretationStatus::Candidate => "CANDIDATE",
            InterpretationStatus::Contributory => "CONTRIBUTORY",
            InterpretationStatus::Causative => "CAUSATIVE",
        }
    }

    // An unset status (proto default) counts as unjudged and is kept.
    pub fn links_gene(status: Option<InterpretationStatus>) -> bool {
        matches!(
            status,
            None | Some(InterpretationStatus::UnknownStatus)
                | Some(InterpretationStatus::Contributory)
                | Some(InterpretationStatus::Causative)
        )
    }
}

impl fmt::Display for InterpretationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl<'de> Deserialize<'de> for InterpretationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(InterpretationStatus::from_proto(&value))
    }
}

pub fn curie_prefix(curie: &str) -> Option<&str> {
    let (prefix, local) = curie.split_once(':')?;
    (!prefix.is_empty() && !local.is_empty()).then_some(prefix)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn case_id_uses_dot_separator() {
        let cohort: Cohort = "POGZ".parse().unwrap();
        let id = CaseId::new(&cohort, "PMID_34133408_case").unwrap();
        assert_eq!(id.as_str(), "phenopacket.store:POGZ.PMID_34133408_case");
    }

    #[test]
    fn case_id_escapes_dots_in_cohort() {
        let a = CaseId::new(&"A.B".parse().unwrap(), "C").unwrap();
        let b = CaseId::new(&"A".parse().unwrap(), "B.C").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "phenopacket.store:A%2EB.C");
    }

    #[test]
    fn case_id_rejects_empty_phenopacket_id() {
        let err = CaseId::new(&Cohort::unknown(), "  ").unwrap_err();
        assert_matches!(err, IngestError::InvalidPhenopacketId(_));
    }

    #[test]
    fn case_id_keeps_whitespace_distinct() {
        let cohort: Cohort = "POGZ".parse().unwrap();
        assert_matches!(
            CaseId::new(&cohort, " p1"),
            Err(IngestError::InvalidPhenopacketId(_))
        );
        assert_matches!(
            CaseId::new(&cohort, "p1 "),
            Err(IngestError::InvalidPhenopacketId(_))
        );

        let padded = CaseId::new(&" POGZ".parse().unwrap(), "p1").unwrap();
        let plain = CaseId::new(&cohort, "p1").unwrap();
        assert_ne!(padded, plain);
        assert_eq!(padded.as_str(), "phenopacket.store:%20POGZ.p1");
    }

    #[test]
    fn parse_cohort_invalid() {
        let err = "a/b".parse::<Cohort>().unwrap_err();
        assert_matches!(err, IngestError::InvalidCohort(_));
        assert!("".parse::<Cohort>().is_err());
    }

    #[test]
    fn release_tag_version() {
        let tag: ReleaseTag = "0.1.24".parse().unwrap();
        assert_eq!(tag.version(), Some((0, 1, 24)));
        let tag: ReleaseTag = "v2".parse().unwrap();
        assert_eq!(tag.version(), Some((2, 0, 0)));
        let tag: ReleaseTag = "nightly".parse().unwrap();
        assert_eq!(tag.version(), None);
    }

    #[test]
    fn latest_release_tag_ignores_non_versions() {
        let tags = ["0.1.9", "0.1.10", "latest", "v0.1.2"];
        let latest = ReleaseTag::latest(tags).unwrap();
        assert_eq!(latest.as_str(), "0.1.10");
        assert!(ReleaseTag::latest(["foo", "bar"]).is_none());
    }

    #[test]
    fn sex_from_proto_values() {
        assert_eq!(Sex::from_proto(&json!("MALE")), Sex::Male);
        assert_eq!(Sex::from_proto(&json!(1)), Sex::Female);
        assert_eq!(Sex::from_proto(&json!("OTHER_SEX")), Sex::Other);
        assert_eq!(Sex::from_proto(&json!("UNKNOWN_SEX")), Sex::Unknown);
    }

    #[test]
    fn gene_inclusion_predicate() {
        assert!(InterpretationStatus::links_gene(None));
        assert!(InterpretationStatus::links_gene(Some(
            InterpretationStatus::Causative
        )));
        assert!(!InterpretationStatus::links_gene(Some(
            InterpretationStatus::Rejected
        )));
        assert!(!InterpretationStatus::links_gene(Some(
            InterpretationStatus::Candidate
        )));
        assert_eq!(
            InterpretationStatus::from_proto(&json!(4)),
            InterpretationStatus::Causative
        );
    }

    #[test]
    fn curie_prefix_split() {
        assert_eq!(curie_prefix("HP:0001263"), Some("HP"));
        assert_eq!(curie_prefix("nocolon"), None);
    }
}
