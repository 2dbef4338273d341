//! # Package Document Model
//!
//! Data types shared by the revision store, the blob store and the unpublish
//! coordinator.
//!
//! ## Key Types
//!
//! - [`PackageDocument`]: one package, all of its versions, and its current [`Revision`]
//! - [`VersionRecord`]: metadata for a single published version
//! - [`Revision`]: opaque optimistic-concurrency token
//! - [`DocumentState`]: outcome of a removal, either an updated document or a cascade delete
//!
//! ## Storage Format
//!
//! Documents serialize to npm-style JSON so they can be served as-is:
//!
//! ```json
//! {
//!   "name": "left-pad",
//!   "_rev": "3-4f1c2a9be07d",
//!   "dist-tags": { "latest": "1.3.0" },
//!   "versions": {
//!     "1.3.0": {
//!       "version": "1.3.0",
//!       "tarballKey": "/left-pad/-/left-pad-1.3.0.tgz",
//!       "dist": { "shasum": "..." }
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Length of the random suffix carried by every revision token.
const REVISION_TAG_LEN: usize = 12;

/// Opaque revision token for optimistic concurrency.
///
/// The textual form is `<seq>-<tag>`: a decimal sequence number followed by a
/// random hex tag. Callers only ever compare tokens for equality; the sequence
/// number is kept for readability in logs. The random tag keeps a recreated
/// document from reusing a token handed out before it was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    seq: u64,
    tag: String,
}

/// Error returned when a revision string does not follow the token scheme.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed revision token: {0}")]
pub struct RevisionParseError(pub String);

impl Revision {
    /// Revision assigned to a freshly created document.
    pub fn initial() -> Self {
        Self::with_seq(1)
    }

    /// Mint the successor of this revision.
    pub fn next(&self) -> Self {
        Self::with_seq(self.seq.saturating_add(1))
    }

    /// Sequence number embedded in the token.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn with_seq(seq: u64) -> Self {
        let mut tag = uuid::Uuid::new_v4().simple().to_string();
        tag.truncate(REVISION_TAG_LEN);
        Self { seq, tag }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.seq, self.tag)
    }
}

impl FromStr for Revision {
    type Err = RevisionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || RevisionParseError(raw.to_string());

        let (seq, tag) = raw.split_once('-').ok_or_else(malformed)?;
        if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let seq: u64 = seq.parse().map_err(|_| malformed())?;
        if seq == 0 {
            return Err(malformed());
        }
        if tag.len() != REVISION_TAG_LEN
            || !tag.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(malformed());
        }

        Ok(Self {
            seq,
            tag: tag.to_string(),
        })
    }
}

impl TryFrom<String> for Revision {
    type Error = RevisionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.to_string()
    }
}

/// Metadata for a single published version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Semantic version string, unique within the owning document
    pub version: String,
    /// Key of the backing tarball in the blob store, if any
    #[serde(rename = "tarballKey", default)]
    pub tarball_key: Option<String>,
    /// Publish-time `dist` metadata (integrity, shasum, tarball URL, cdn key)
    #[serde(default)]
    pub dist: Map<String, Value>,
}

impl VersionRecord {
    pub fn new(version: impl Into<String>, tarball_key: Option<String>) -> Self {
        Self {
            version: version.into(),
            tarball_key,
            dist: Map::new(),
        }
    }

    /// Build a record from an npm version manifest.
    ///
    /// The blob key is taken from `dist.key`. Older manifests do not carry one,
    /// in which case it is derived from the filename in `dist.tarball` as
    /// `/<name>/-/<filename>`. Manifests without either have no backing blob.
    pub fn from_manifest(package: &str, manifest: &Value) -> Option<Self> {
        let version = manifest.get("version")?.as_str()?.to_string();
        let dist = manifest
            .get("dist")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let tarball_key = dist
            .get("key")
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .or_else(|| {
                let url = dist.get("tarball")?.as_str()?;
                let filename = url.rsplit('/').next().filter(|f| !f.is_empty())?;
                Some(format!("/{package}/-/{filename}"))
            });

        Some(Self {
            version,
            tarball_key,
            dist,
        })
    }
}

/// A package and every version currently published under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDocument {
    pub name: String,
    #[serde(rename = "_rev")]
    pub revision: Revision,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    pub versions: BTreeMap<String, VersionRecord>,
}

impl PackageDocument {
    /// Create a document holding its first version.
    pub fn new(name: impl Into<String>, first: VersionRecord) -> Self {
        let mut doc = Self {
            name: name.into(),
            revision: Revision::initial(),
            dist_tags: BTreeMap::new(),
            versions: BTreeMap::new(),
        };
        doc.insert_version(first);
        doc
    }

    pub fn version(&self, version: &str) -> Option<&VersionRecord> {
        self.versions.get(version)
    }

    /// Insert a version and move `latest` forward when it is the highest one.
    ///
    /// Returns `false` without touching the document if the version exists.
    pub fn insert_version(&mut self, record: VersionRecord) -> bool {
        if self.versions.contains_key(&record.version) {
            return false;
        }

        let version = record.version.clone();
        self.versions.insert(version.clone(), record);
        if self.highest_version().as_deref() == Some(version.as_str())
            || !self.dist_tags.contains_key("latest")
        {
            self.dist_tags.insert("latest".to_string(), version);
        }
        true
    }

    /// Remove a version and repair `dist-tags`.
    ///
    /// Every tag pointing at the removed version is dropped; `latest` is
    /// re-pointed at the highest remaining version when one exists.
    pub fn remove_version(&mut self, version: &str) -> Option<VersionRecord> {
        let removed = self.versions.remove(version)?;

        let was_latest = self.dist_tags.get("latest").map(String::as_str) == Some(version);
        self.dist_tags.retain(|_, tagged| tagged != version);
        if was_latest {
            if let Some(highest) = self.highest_version() {
                self.dist_tags.insert("latest".to_string(), highest);
            }
        }

        Some(removed)
    }

    /// Highest version by semver precedence.
    pub fn highest_version(&self) -> Option<String> {
        self.versions
            .keys()
            .filter_map(|raw| semver::Version::parse(raw).ok().map(|v| (v, raw)))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, raw)| raw.clone())
    }
}

/// State of a document after a version was removed.
///
/// A tagged result rather than a flag so callers must handle the cascade.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentState {
    /// Other versions remain; the document was stored under a new revision
    Updated(PackageDocument),
    /// The removed version was the last one and the document no longer exists
    Deleted,
}

impl DocumentState {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DocumentState::Deleted)
    }

    /// New revision of the surviving document, if any.
    pub fn revision(&self) -> Option<&Revision> {
        match self {
            DocumentState::Updated(doc) => Some(&doc.revision),
            DocumentState::Deleted => None,
        }
    }
}

/// Result of a successful `remove_version`.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    /// The record that was removed
    pub record: VersionRecord,
    /// What remains of the document
    pub state: DocumentState,
}
