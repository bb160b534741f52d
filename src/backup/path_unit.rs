use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf, Prefix};
use std::sync::Arc;

/// Whether a unit of work is a single file or a directory to be expanded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    File,
    Directory,
}

/// Copy policy token, forwarded untouched to the [`CopyPolicy`](crate::backup::copy_policy::CopyPolicy).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
    /// Include everything the policy does not exclude
    #[default]
    All,
    /// Include only entries changed since the covering prior backup
    Changed,
}

/// Identifies one destination container, keyed by the originating volume.
#[derive(Clone, Debug, Display, From, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationId(Arc<str>);

impl From<&str> for DestinationId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for DestinationId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl AsRef<str> for DestinationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One item of backup work.
///
/// Identity is the path alone: two units for the same path compare equal
/// whatever their kind or copy mode.
#[derive(Clone, Debug)]
pub struct PathUnit {
    pub kind: PathKind,
    pub copy_mode: CopyMode,
    pub path: Arc<Path>,
}

impl PathUnit {
    pub fn new<P: Into<Arc<Path>>>(kind: PathKind, copy_mode: CopyMode, path: P) -> Self {
        Self {
            kind,
            copy_mode,
            path: path.into(),
        }
    }

    pub fn file<P: Into<Arc<Path>>>(path: P, copy_mode: CopyMode) -> Self {
        Self::new(PathKind::File, copy_mode, path)
    }

    pub fn directory<P: Into<Arc<Path>>>(path: P, copy_mode: CopyMode) -> Self {
        Self::new(PathKind::Directory, copy_mode, path)
    }

    /// Builds a unit whose kind is read from disk. Anything that is not an
    /// existing regular file becomes a directory unit, which expands to
    /// nothing when the path is missing.
    pub fn from_disk<P: Into<Arc<Path>>>(path: P, copy_mode: CopyMode) -> Self {
        let path = path.into();
        let kind = if path.is_file() {
            PathKind::File
        } else {
            PathKind::Directory
        };
        Self::new(kind, copy_mode, path)
    }

    pub fn destination(&self) -> DestinationId {
        volume_of(&self.path)
    }
}

impl PartialEq for PathUnit {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for PathUnit {}

impl Hash for PathUnit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state)
    }
}

/// Resolves the volume a path lives on.
///
/// Windows paths resolve to their prefix (`C:\foo` is `C`, `\\srv\share\foo` is
/// `srv_share`). Elsewhere the first component under the root is used
/// (`/home/me/foo` is `home`), and the root itself is `root`.
pub fn volume_of<P: AsRef<Path>>(path: P) -> DestinationId {
    let path = path.as_ref();
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    for component in absolute.components() {
        match component {
            Component::Prefix(prefix) => return prefix_id(prefix.kind()),
            Component::Normal(name) => return name.to_string_lossy().into_owned().into(),
            Component::RootDir | Component::CurDir | Component::ParentDir => {}
        }
    }
    "root".into()
}

fn prefix_id(prefix: Prefix) -> DestinationId {
    match prefix {
        Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
            char::from(letter).to_ascii_uppercase().to_string().into()
        }
        Prefix::UNC(server, share) | Prefix::VerbatimUNC(server, share) => format!(
            "{}_{}",
            server.to_string_lossy(),
            share.to_string_lossy()
        )
        .into(),
        Prefix::DeviceNS(name) | Prefix::Verbatim(name) => name.to_string_lossy().into_owned().into(),
    }
}

/// Name of a path inside its container: the path with volume prefix and root
/// stripped, so `C:\foo\bar.txt` is stored as `foo\bar.txt`.
pub fn entry_name<P: AsRef<Path>>(path: P) -> PathBuf {
    path.as_ref()
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_volume_of_unix_uses_top_level_dir() {
        assert_eq!(volume_of("/home/me/docs/a.txt"), DestinationId::from("home"));
        assert_eq!(volume_of("/tmp"), DestinationId::from("tmp"));
        assert_eq!(volume_of("/"), DestinationId::from("root"));
    }

    #[cfg(windows)]
    #[test]
    fn test_volume_of_windows_uses_drive_letter() {
        assert_eq!(volume_of(r"c:\foo\bar.txt"), DestinationId::from("C"));
        assert_eq!(volume_of(r"\\srv\share\foo"), DestinationId::from("srv_share"));
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_name_strips_root() {
        assert_eq!(entry_name("/home/me/bar.txt"), PathBuf::from("home/me/bar.txt"));
    }

    #[cfg(windows)]
    #[test]
    fn test_entry_name_strips_drive() {
        assert_eq!(entry_name(r"C:\foo\bar.txt"), PathBuf::from(r"foo\bar.txt"));
    }

    #[test]
    fn test_entry_name_is_relative() {
        let dir = TempDir::new().unwrap();
        let name = entry_name(dir.path().join("x.txt"));
        assert!(name.is_relative());
        assert!(name.ends_with("x.txt"));
    }

    #[test]
    fn test_path_unit_identity_is_path() {
        let a = PathUnit::file(PathBuf::from("/data/a"), CopyMode::All);
        let b = PathUnit::directory(PathBuf::from("/data/a"), CopyMode::Changed);
        let c = PathUnit::file(PathBuf::from("/data/c"), CopyMode::All);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_from_disk_infers_kind() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "content").unwrap();

        assert_eq!(PathUnit::from_disk(file, CopyMode::All).kind, PathKind::File);
        assert_eq!(
            PathUnit::from_disk(dir.path(), CopyMode::All).kind,
            PathKind::Directory
        );
        assert_eq!(
            PathUnit::from_disk(dir.path().join("missing"), CopyMode::All).kind,
            PathKind::Directory
        );
    }

    #[test]
    fn test_copy_mode_deserialization() {
        let mode: CopyMode = serde_json::from_str("\"changed\"").unwrap();
        assert_eq!(mode, CopyMode::Changed);
        assert_eq!(CopyMode::default(), CopyMode::All);
    }
}
