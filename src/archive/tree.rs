//! # Tree Serializer
//!
//! Walks a directory depth-first, pre-order, and turns every node into a
//! normalized [`ArchiveEntry`]:
//!
//! - names are the `/`-joined path relative to the walk root, no leading `/`
//!   and no `./` prefix;
//! - the root itself is either a `"."` directory entry or absent, depending
//!   on the [`RootPolicy`];
//! - modes come from [`crate::fsx::entry_mode`], never from the raw host mode;
//! - children are sorted, so the archive does not depend on the order the
//!   filesystem happens to list them in.
//!
//! Symlinks are followed. A link back to one of its own ancestors is an
//! error rather than an endless walk. Sockets, FIFOs and devices are skipped.

use crate::archive::EntrySink;
use crate::common::{ArchiveEntry, RootPolicy, ROOT_ENTRY_NAME};
use crate::fsx::entry_mode;
use crate::IpkError;

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Order in which the children of one directory are emitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChildOrder {
    /// Byte-wise by file name.
    #[default]
    Lexicographic,
    /// Listed names first, in list order; everything else lexicographically
    /// after them.
    Ranked(Vec<String>),
}

impl ChildOrder {
    pub fn compare(&self, a: &OsStr, b: &OsStr) -> Ordering {
        match self {
            ChildOrder::Lexicographic => a.cmp(b),
            ChildOrder::Ranked(names) => {
                let rank = |name: &OsStr| {
                    names
                        .iter()
                        .position(|n| OsStr::new(n) == name)
                        .unwrap_or(names.len())
                };
                rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
            }
        }
    }
}

/// Counters for one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
    pub skipped: u64,
}

/// Serializes a directory tree into an [`EntrySink`].
#[derive(Debug, Clone)]
pub struct TreeSerializer {
    policy: RootPolicy,
    order: ChildOrder,
}

impl TreeSerializer {
    pub fn new(policy: RootPolicy) -> Self {
        Self { policy, order: ChildOrder::default() }
    }

    pub fn with_order(mut self, order: ChildOrder) -> Self {
        self.order = order;
        self
    }

    /// Walks `root` and writes every node to `sink`.
    ///
    /// Any failure aborts the walk; whatever the sink already received is
    /// left for the caller to discard. At most one source file is open at a
    /// time: each is opened, drained into the sink and closed before the walk
    /// moves on.
    pub fn serialize<S: EntrySink + ?Sized>(&self, root: &Path, sink: &mut S) -> Result<WalkStats, IpkError> {
        let root_meta = fs::metadata(root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => IpkError::NotFound { what: "archive root", path: root.to_path_buf() },
            _ => IpkError::io(root, e),
        })?;
        if !root_meta.is_dir() {
            return Err(IpkError::Unarchivable { path: root.to_path_buf(), reason: "not a directory".into() });
        }

        let mut stats = WalkStats::default();
        let order = self.order.clone();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by(move |a, b| order.compare(a.file_name(), b.file_name()));

        for item in walker {
            let node = item.map_err(|e| walk_error(root, e))?;

            if node.depth() == 0 {
                if self.policy == RootPolicy::Marked {
                    sink.put_directory(&ArchiveEntry::directory(ROOT_ENTRY_NAME, entry_mode(&root_meta)))?;
                    stats.directories += 1;
                }
                continue;
            }

            let relative = node.path().strip_prefix(root).map_err(|_| IpkError::Unarchivable {
                path: node.path().to_path_buf(),
                reason: "path escapes the walk root".into(),
            })?;
            let name = entry_name(relative)?;
            let file_type = node.file_type();

            if file_type.is_dir() {
                let meta = node.metadata().map_err(|e| walk_error(root, e))?;
                let entry = ArchiveEntry::directory(name, entry_mode(&meta));
                trace!(name = %entry.name, mode = entry.mode, "directory");
                sink.put_directory(&entry)?;
                stats.directories += 1;
            } else if file_type.is_file() {
                let mut file = File::open(node.path()).map_err(|e| IpkError::io(node.path(), e))?;
                let meta = file.metadata().map_err(|e| IpkError::io(node.path(), e))?;
                let entry = ArchiveEntry::file(name, entry_mode(&meta));
                trace!(name = %entry.name, mode = entry.mode, size = meta.len(), "file");
                sink.put_file(&entry, meta.len(), &mut file)?;
                stats.files += 1;
                stats.bytes += meta.len();
            } else {
                warn!(path = %node.path().display(), "skipping special file");
                stats.skipped += 1;
            }
        }

        debug!(
            root = %root.display(),
            files = stats.files,
            directories = stats.directories,
            bytes = stats.bytes,
            "serialized tree"
        );
        Ok(stats)
    }
}

/// `serialize(rootPath, rootPolicy, sink)` with lexicographic child order.
pub fn serialize<S: EntrySink + ?Sized>(root: &Path, policy: RootPolicy, sink: &mut S) -> Result<WalkStats, IpkError> {
    TreeSerializer::new(policy).serialize(root, sink)
}

/// Joins the components of `relative` with `/`.
fn entry_name(relative: &Path) -> Result<String, IpkError> {
    let mut name = String::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| IpkError::Unarchivable {
            path: relative.to_path_buf(),
            reason: "file name is not valid UTF-8".into(),
        })?;
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(part);
    }
    Ok(name)
}

fn walk_error(root: &Path, err: walkdir::Error) -> IpkError {
    let path = err.path().unwrap_or(root).to_path_buf();
    if let Some(ancestor) = err.loop_ancestor() {
        return IpkError::Unarchivable {
            reason: format!("symlink loops back to '{}'", ancestor.display()),
            path,
        };
    }
    IpkError::io(path, io::Error::from(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EntryKind;
    use crate::ErrorKind;
    use std::io::Read;

    /// Keeps entries in memory instead of writing a tar stream.
    #[derive(Default)]
    struct RecordingSink {
        entries: Vec<(ArchiveEntry, Vec<u8>)>,
    }

    impl EntrySink for RecordingSink {
        fn put_directory(&mut self, entry: &ArchiveEntry) -> Result<(), IpkError> {
            self.entries.push((entry.clone(), Vec::new()));
            Ok(())
        }

        fn put_file(&mut self, entry: &ArchiveEntry, size: u64, content: &mut dyn Read) -> Result<(), IpkError> {
            let mut data = Vec::new();
            content.read_to_end(&mut data).unwrap();
            assert_eq!(data.len() as u64, size);
            self.entries.push((entry.clone(), data));
            Ok(())
        }
    }

    impl RecordingSink {
        fn names(&self) -> Vec<&str> {
            self.entries.iter().map(|(e, _)| e.name.as_str()).collect()
        }
    }

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("usr/bin")).unwrap();
        fs::write(dir.path().join("usr/bin/hello"), b"#!/bin/sh\necho hi\n").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    #[test]
    fn test_marked_root_comes_first_and_children_are_bare() {
        let tree = sample_tree();
        let mut sink = RecordingSink::default();
        let stats = serialize(tree.path(), RootPolicy::Marked, &mut sink).unwrap();

        assert_eq!(sink.names(), [".", "a.txt", "b.txt", "empty", "usr", "usr/bin", "usr/bin/hello"]);
        assert_eq!(sink.entries[0].0.kind, EntryKind::Directory);
        assert_eq!(stats.files, 3);
        assert_eq!(stats.directories, 4);
        assert_eq!(stats.bytes, 1 + 1 + 18);
    }

    #[test]
    fn test_transparent_root_has_no_entry() {
        let tree = sample_tree();
        let mut sink = RecordingSink::default();
        serialize(tree.path(), RootPolicy::Transparent, &mut sink).unwrap();

        assert_eq!(sink.names(), ["a.txt", "b.txt", "empty", "usr", "usr/bin", "usr/bin/hello"]);
        let (hello, content) = sink.entries.last().unwrap();
        assert_eq!(hello.kind, EntryKind::File);
        assert_eq!(content, b"#!/bin/sh\necho hi\n");
    }

    #[test]
    fn test_ranked_order_puts_listed_names_first() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["data.tar.gz", "control.tar.gz", "debian-binary", "zzz"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        let order = ChildOrder::Ranked(vec!["debian-binary".into(), "control.tar.gz".into(), "data.tar.gz".into()]);
        let mut sink = RecordingSink::default();
        TreeSerializer::new(RootPolicy::Transparent)
            .with_order(order)
            .serialize(dir.path(), &mut sink)
            .unwrap();

        assert_eq!(sink.names(), ["debian-binary", "control.tar.gz", "data.tar.gz", "zzz"]);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RecordingSink::default();
        let err = serialize(&dir.path().join("absent"), RootPolicy::Marked, &mut sink).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(sink.entries.is_empty());
    }

    #[test]
    fn test_file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = serialize(&file, RootPolicy::Marked, &mut RecordingSink::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_entry_name_joins_with_slash() {
        let name = entry_name(Path::new("usr").join("share").join("doc").as_path()).unwrap();
        assert_eq!(name, "usr/share/doc");
    }

    #[test]
    fn test_ranked_compare_falls_back_to_bytes() {
        let order = ChildOrder::Ranked(vec!["z".into()]);
        assert_eq!(order.compare(OsStr::new("z"), OsStr::new("a")), Ordering::Less);
        assert_eq!(order.compare(OsStr::new("b"), OsStr::new("a")), Ordering::Greater);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_followed() {
        let tree = sample_tree();
        std::os::unix::fs::symlink("a.txt", tree.path().join("link.txt")).unwrap();
        std::os::unix::fs::symlink("usr", tree.path().join("usr-link")).unwrap();

        let mut sink = RecordingSink::default();
        serialize(tree.path(), RootPolicy::Marked, &mut sink).unwrap();

        let link = sink.entries.iter().find(|(e, _)| e.name == "link.txt").unwrap();
        assert_eq!(link.0.kind, EntryKind::File);
        assert_eq!(link.1, b"a");
        assert!(sink.names().contains(&"usr-link/bin/hello"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_an_error() {
        let tree = sample_tree();
        std::os::unix::fs::symlink("..", tree.path().join("usr/up")).unwrap();

        let err = serialize(tree.path(), RootPolicy::Marked, &mut RecordingSink::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("loops back"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_an_error() {
        let tree = sample_tree();
        std::os::unix::fs::symlink("nowhere", tree.path().join("broken")).unwrap();

        let err = serialize(tree.path(), RootPolicy::Marked, &mut RecordingSink::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
