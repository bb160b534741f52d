//! Decides which discovered children make it into the backup.
//!
//! The pipeline only forwards the [`CopyMode`] token and respects the boolean
//! answer; the decision itself lives behind [`CopyPolicy`].

use crate::backup::path_unit::{CopyMode, PathKind};
use crate::backup::result_error::result::Result;

use bon::Builder;
use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use getset::Getters;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize};

use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::result;

pub trait CopyPolicy: Send + Sync + Debug {
    /// Called once per discovered child of an expanded directory.
    fn include(&self, path: &Path, kind: PathKind, mode: CopyMode) -> bool;
}

/// Includes every child.
#[derive(Clone, Copy, Debug, Default)]
pub struct IncludeAll;

impl CopyPolicy for IncludeAll {
    fn include(&self, _path: &Path, _kind: PathKind, _mode: CopyMode) -> bool {
        true
    }
}

/// When a path was last backed up.
#[derive(
    Clone, Debug, Serialize, Deserialize, Builder, PartialEq, Eq, PartialOrd, Ord, Getters,
)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct PriorBackupRecord {
    #[builder(into)]
    path: PathBuf,
    backed_up_at: DateTime<Utc>,
}

/// A glob pattern deserialized from a plain string, matched with literal separators.
#[derive(Clone, Debug, From, Display, Serialize, PartialEq, Eq, Getters)]
#[serde(transparent)]
#[getset(get = "pub")]
pub struct CustomDeserializedGlob {
    glob: Glob,
}

impl CustomDeserializedGlob {
    pub fn new<S: AsRef<str>>(pattern: S) -> result::Result<Self, globset::Error> {
        GlobBuilder::new(pattern.as_ref())
            .literal_separator(true)
            .build()
            .map(CustomDeserializedGlob::from)
    }
}

struct CustomGlobVisitor;

impl Visitor<'_> for CustomGlobVisitor {
    type Value = CustomDeserializedGlob;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        CustomDeserializedGlob::new(v).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for CustomDeserializedGlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(CustomGlobVisitor)
    }
}

/// Glob exclusions plus "changed since the last backup" checks.
///
/// Excluded paths are always rejected. In [`CopyMode::Changed`] a file is kept
/// only when no prior record covers it or it was modified after the most
/// specific covering record. Directories are kept unless excluded so their
/// children still get a say.
#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct PriorBackupPolicy {
    records: Vec<PriorBackupRecord>,
    #[getset(skip)]
    exclude: GlobSet,
}

impl PriorBackupPolicy {
    pub fn new(
        mut records: Vec<PriorBackupRecord>,
        exclude: &[CustomDeserializedGlob],
    ) -> Result<Self> {
        records.sort();

        let mut builder = GlobSetBuilder::new();
        exclude.iter().for_each(|g| {
            builder.add(g.glob.clone());
        });
        let exclude = builder.build()?;
        tracing::debug!(
            "Copy policy with {} prior backup records and {} exclusions",
            records.len(),
            exclude.len()
        );

        Ok(Self { records, exclude })
    }

    /// The most specific record whose path contains `path`.
    fn covering_record(&self, path: &Path) -> Option<&PriorBackupRecord> {
        self.records
            .iter()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())
    }

    fn changed_since_record(&self, path: &Path) -> bool {
        let Some(record) = self.covering_record(path) else {
            return true;
        };
        match std::fs::metadata(path).and_then(|md| md.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified) > record.backed_up_at,
            Err(e) => {
                tracing::debug!("Cannot read mtime of {:?}, including it: {}", path, e);
                true
            }
        }
    }
}

impl CopyPolicy for PriorBackupPolicy {
    fn include(&self, path: &Path, kind: PathKind, mode: CopyMode) -> bool {
        if self.exclude.is_match(path) {
            tracing::trace!("Skipping {:?}, excluded by glob", path);
            return false;
        }
        match (mode, kind) {
            (CopyMode::All, _) | (CopyMode::Changed, PathKind::Directory) => true,
            (CopyMode::Changed, PathKind::File) => {
                let changed = self.changed_since_record(path);
                if !changed {
                    tracing::trace!("Skipping {:?}, unchanged since prior backup", path);
                }
                changed
            }
        }
    }
}
