//! Tar packages as VFS sources.
//!
//! A package is a plain tar archive with a `.vfs` manifest at its root. Only
//! the manifest is unpacked on registration; members are read straight from
//! the archive when their content is first accessed.
//!
//! Every entry that is walked is checked before use: no `..` components, no
//! device or fifo entries, and no links pointing outside the archive.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use tar::{Archive, Entry};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use super::content::MIME_TAR;
use super::error::{VfsError, VfsResult};
use super::node::Node;

/// File name of the manifest inside packages and source directories.
pub const MANIFEST_NAME: &str = ".vfs";

/// Default upper bound on the number of entries walked in one archive.
pub const DEFAULT_MAX_ARCHIVE_MEMBERS: usize = 10_000;

const SCRATCH_PREFIX: &str = "strata-pkg-";

/// One archive being registered.
///
/// Owns a uniquely named scratch directory that is removed by
/// [`Package::dispose`] or on drop.
#[derive(Debug)]
pub struct Package {
    path: PathBuf,
    scratch: TempDir,
    max_members: usize,
}

impl Package {
    pub fn new(path: impl Into<PathBuf>) -> VfsResult<Self> {
        Self::with_options(path, None, DEFAULT_MAX_ARCHIVE_MEMBERS)
    }

    /// Create a package with its scratch directory under `scratch_root`
    /// (the system temp directory if `None`).
    pub fn with_options(
        path: impl Into<PathBuf>,
        scratch_root: Option<&Path>,
        max_members: usize,
    ) -> VfsResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let scratch = match scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let path = path.into();
        debug!(package = %path.display(), scratch = %scratch.path().display(), "package opened");
        Ok(Self {
            path,
            scratch,
            max_members,
        })
    }

    /// Path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scratch directory the manifest is extracted into.
    pub fn extract_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Read the manifest and merge the tree it describes into `root`.
    ///
    /// Every package-file descriptor in the manifest is bound to this
    /// archive. Fails with `InvalidInput` if the file is not a tar archive,
    /// has no manifest, or the manifest is malformed; `root` is only touched
    /// once the whole manifest has parsed and checked out.
    pub fn load(&self, root: &mut Node) -> VfsResult<()> {
        self.check_is_tar()?;

        let manifest_path = self.extract_manifest()?;
        let data: serde_json::Value = serde_json::from_slice(&fs::read(&manifest_path)?)
            .map_err(|e| {
                error!(package = %self.path.display(), "malformed package manifest: {e}");
                VfsError::invalid_input(format!(
                    "malformed manifest in {}: {e}",
                    self.path.display()
                ))
            })?;

        let mut subtree = Node::from_manifest(&data)?;
        if !subtree.is_dir() {
            return Err(VfsError::invalid_input(format!(
                "manifest in {} must describe a directory",
                self.path.display()
            )));
        }
        subtree.bind_package(&self.path, self.max_members);

        root.merge_with(subtree)?;
        info!(package = %self.path.display(), "package loaded");
        Ok(())
    }

    /// Remove the scratch directory, reporting any failure.
    pub fn dispose(self) -> VfsResult<()> {
        debug!(package = %self.path.display(), "disposing package");
        self.scratch.close()?;
        Ok(())
    }

    fn check_is_tar(&self) -> VfsResult<()> {
        if !self.path.is_file() {
            return Err(VfsError::invalid_input(format!(
                "package {} is not a file",
                self.path.display()
            )));
        }

        let detected = infer::get_from_path(&self.path)?.map(|kind| kind.mime_type());
        if detected != Some(MIME_TAR) {
            error!(
                package = %self.path.display(),
                detected = detected.unwrap_or("unknown"),
                "package is not a tar archive"
            );
            return Err(VfsError::invalid_input(format!(
                "package {} is not a tar archive (detected {})",
                self.path.display(),
                detected.unwrap_or("unknown type")
            )));
        }
        Ok(())
    }

    fn extract_manifest(&self) -> VfsResult<PathBuf> {
        let mut archive = Archive::new(File::open(&self.path)?);
        let entries = archive
            .entries()
            .map_err(|e| archive_error(&self.path, e))?;

        for (index, entry) in entries.enumerate() {
            check_member_count(&self.path, index, self.max_members)?;
            let mut entry = entry.map_err(|e| archive_error(&self.path, e))?;
            check_entry(&self.path, &entry)?;

            if member_name(&self.path, &entry)? != MANIFEST_NAME {
                continue;
            }
            if !entry.header().entry_type().is_file() {
                return Err(VfsError::invalid_input(format!(
                    "manifest in {} is not a regular file",
                    self.path.display()
                )));
            }

            let unpacked = entry
                .unpack_in(self.scratch.path())
                .map_err(|e| archive_error(&self.path, e))?;
            if !unpacked {
                return Err(VfsError::invalid_input(format!(
                    "refusing to unpack manifest of {}",
                    self.path.display()
                )));
            }
            debug!(package = %self.path.display(), "manifest extracted");
            return Ok(self.scratch.path().join(MANIFEST_NAME));
        }

        error!(package = %self.path.display(), "package has no manifest");
        Err(VfsError::invalid_input(format!(
            "package {} has no {MANIFEST_NAME} manifest",
            self.path.display()
        )))
    }
}

/// Read one member of `archive` into memory.
///
/// Leading `/` and `./` are ignored on both sides of the comparison. Returns
/// `None` if no entry matches.
pub(crate) fn read_member(
    archive_path: &Path,
    member: &str,
    max_members: usize,
) -> VfsResult<Option<Vec<u8>>> {
    let wanted = normalize_member(member);
    if has_parent_dir(Path::new(wanted)) {
        return Err(VfsError::invalid_input(format!(
            "package member {member} escapes the archive"
        )));
    }

    let mut archive = Archive::new(File::open(archive_path)?);
    let entries = archive
        .entries()
        .map_err(|e| archive_error(archive_path, e))?;

    for (index, entry) in entries.enumerate() {
        check_member_count(archive_path, index, max_members)?;
        let mut entry = entry.map_err(|e| archive_error(archive_path, e))?;
        check_entry(archive_path, &entry)?;

        if member_name(archive_path, &entry)? != wanted {
            continue;
        }
        if !entry.header().entry_type().is_file() {
            return Err(VfsError::invalid_input(format!(
                "package member {member} in {} is not a regular file",
                archive_path.display()
            )));
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        return Ok(Some(bytes));
    }
    Ok(None)
}

fn normalize_member(name: &str) -> &str {
    let mut name = name.trim_end_matches('/');
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            return name;
        }
    }
}

fn has_parent_dir(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

fn member_name<R: Read>(archive_path: &Path, entry: &Entry<'_, R>) -> VfsResult<String> {
    let path = entry.path().map_err(|e| archive_error(archive_path, e))?;
    Ok(normalize_member(&path.to_string_lossy()).to_string())
}

fn check_member_count(archive_path: &Path, index: usize, max_members: usize) -> VfsResult<()> {
    if index >= max_members {
        error!(package = %archive_path.display(), max_members, "too many archive members");
        return Err(VfsError::invalid_input(format!(
            "package {} has more than {max_members} members",
            archive_path.display()
        )));
    }
    Ok(())
}

fn check_entry<R: Read>(archive_path: &Path, entry: &Entry<'_, R>) -> VfsResult<()> {
    let path = entry.path().map_err(|e| archive_error(archive_path, e))?;
    let entry_type = entry.header().entry_type();

    let unsafe_reason = if has_parent_dir(&path) {
        Some("path traversal")
    } else if entry_type.is_character_special()
        || entry_type.is_block_special()
        || entry_type.is_fifo()
    {
        Some("device entry")
    } else if entry_type.is_symlink() || entry_type.is_hard_link() {
        match entry.link_name().map_err(|e| archive_error(archive_path, e))? {
            Some(target) if target.is_absolute() || has_parent_dir(&target) => {
                Some("link outside the archive")
            }
            _ => None,
        }
    } else {
        None
    };

    if let Some(reason) = unsafe_reason {
        warn!(package = %archive_path.display(), member = %path.display(), reason, "unsafe archive member");
        return Err(VfsError::invalid_input(format!(
            "unsafe member {} in {}: {reason}",
            path.display(),
            archive_path.display()
        )));
    }
    Ok(())
}

fn archive_error(archive_path: &Path, e: io::Error) -> VfsError {
    VfsError::invalid_input(format!("failed to read archive {}: {e}", archive_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::descriptor::Descriptor;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tar::{Builder, EntryType, Header};

    fn manifest() -> String {
        json!({
            "name": "ROOT",
            "type": "directory",
            "subdirectories": {
                "d1": {
                    "name": "d1",
                    "type": "directory",
                    "files": {
                        "f1.txt": {
                            "name": "f1.txt",
                            "type": "file",
                            "resource": [
                                { "version": 1, "descriptor": { "type": "packagefile", "path": "/d1/f1.txt" } }
                            ]
                        }
                    }
                }
            }
        })
        .to_string()
    }

    fn append(builder: &mut Builder<File>, name: &str, data: &[u8]) {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, data).unwrap();
    }

    /// Append an entry with a raw name, bypassing the builder's path checks.
    fn append_raw(builder: &mut Builder<File>, name: &str, entry_type: EntryType, link: &str) {
        let mut header = Header::new_gnu();
        {
            let gnu = header.as_gnu_mut().unwrap();
            gnu.name[..name.len()].copy_from_slice(name.as_bytes());
            gnu.linkname[..link.len()].copy_from_slice(link.as_bytes());
        }
        header.set_entry_type(entry_type);
        header.set_size(0);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, io::empty()).unwrap();
    }

    fn build(dir: &Path, name: &str, fill: impl FnOnce(&mut Builder<File>)) -> PathBuf {
        let path = dir.join(name);
        let mut builder = Builder::new(File::create(&path).unwrap());
        fill(&mut builder);
        builder.finish().unwrap();
        path
    }

    fn good_archive(dir: &Path) -> PathBuf {
        build(dir, "base.pkg", |b| {
            append(b, ".vfs", manifest().as_bytes());
            append(b, "d1/f1.txt", b"hello from the package");
        })
    }

    #[test]
    fn test_load_binds_descriptors() {
        let dir = TempDir::new().unwrap();
        let archive = good_archive(dir.path());

        let package = Package::new(&archive).unwrap();
        let mut root = Node::root();
        package.load(&mut root).unwrap();
        assert!(package.extract_dir().join(MANIFEST_NAME).is_file());

        let file = root.get_node("/d1/f1.txt").unwrap();
        let latest = file.latest().unwrap();
        assert_eq!(latest.descriptor().package_path(), Some(archive.as_path()));

        let content = latest.content().unwrap().unwrap();
        assert_eq!(content.as_text(), Some("hello from the package"));
        assert!(matches!(latest.descriptor(), Descriptor::PackageFile(_)));
    }

    #[test]
    fn test_dispose_removes_scratch() {
        let dir = TempDir::new().unwrap();
        let package = Package::with_options(good_archive(dir.path()), Some(dir.path()), 16).unwrap();
        let scratch = package.extract_dir().to_path_buf();
        assert!(scratch.starts_with(dir.path()));
        assert!(scratch.file_name().unwrap().to_string_lossy().starts_with(SCRATCH_PREFIX));

        package.load(&mut Node::root()).unwrap();
        package.dispose().unwrap();
        assert!(!scratch.exists());
    }

    #[test]
    fn test_scratch_dirs_are_unique() {
        let dir = TempDir::new().unwrap();
        let archive = good_archive(dir.path());
        let a = Package::new(&archive).unwrap();
        let b = Package::new(&archive).unwrap();
        assert!(a.extract_dir() != b.extract_dir());
    }

    #[test]
    fn test_not_a_tar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.pkg");
        fs::write(&path, "just some text, long enough to not be anything in particular").unwrap();

        let mut root = Node::root();
        let err = Package::new(&path).unwrap().load(&mut root).unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(root.num_children(), 0);
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let archive = build(dir.path(), "nomanifest.pkg", |b| append(b, "d1/f1.txt", b"x"));
        let err = Package::new(&archive).unwrap().load(&mut Node::root()).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_malformed_manifest() {
        let dir = TempDir::new().unwrap();
        let archive = build(dir.path(), "bad.pkg", |b| append(b, ".vfs", b"{ not json"));
        let err = Package::new(&archive).unwrap().load(&mut Node::root()).unwrap_err();
        assert!(err.is_invalid_input());

        let archive = build(dir.path(), "file.pkg", |b| {
            append(b, ".vfs", br#"{"name": "f", "type": "file"}"#)
        });
        let err = Package::new(&archive).unwrap().load(&mut Node::root()).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_member_limit() {
        let dir = TempDir::new().unwrap();
        let archive = build(dir.path(), "big.pkg", |b| {
            for i in 0..5 {
                append(b, &format!("f{i}.txt"), b"x");
            }
            append(b, ".vfs", manifest().as_bytes());
        });
        let package = Package::with_options(&archive, None, 3).unwrap();
        assert!(package.load(&mut Node::root()).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_unsafe_members_rejected() {
        let dir = TempDir::new().unwrap();

        let traversal = build(dir.path(), "traversal.pkg", |b| {
            append_raw(b, "../escape.txt", EntryType::Regular, "");
            append(b, ".vfs", manifest().as_bytes());
        });
        let symlink = build(dir.path(), "symlink.pkg", |b| {
            append_raw(b, "passwd", EntryType::Symlink, "/etc/passwd");
            append(b, ".vfs", manifest().as_bytes());
        });
        let device = build(dir.path(), "device.pkg", |b| {
            append_raw(b, "null", EntryType::Char, "");
            append(b, ".vfs", manifest().as_bytes());
        });

        for archive in [traversal, symlink, device] {
            let mut root = Node::root();
            let err = Package::new(&archive).unwrap().load(&mut root).unwrap_err();
            assert!(err.is_invalid_input(), "{}", archive.display());
            assert_eq!(root.num_children(), 0);
        }
    }

    #[test]
    fn test_read_member() {
        let dir = TempDir::new().unwrap();
        let archive = good_archive(dir.path());

        let bytes = read_member(&archive, "/d1/f1.txt", 16).unwrap().unwrap();
        assert_eq!(bytes, b"hello from the package");
        assert!(read_member(&archive, "./d1/f1.txt", 16).unwrap().is_some());
        assert!(read_member(&archive, "d1/missing.txt", 16).unwrap().is_none());
        assert!(read_member(&archive, "d1", 16).unwrap().is_none());
        assert!(read_member(&archive, "../d1/f1.txt", 16).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_normalize_member() {
        assert_eq!(normalize_member("/d1/f1.txt"), "d1/f1.txt");
        assert_eq!(normalize_member("./.vfs"), ".vfs");
        assert_eq!(normalize_member("d1/"), "d1");
        assert_eq!(normalize_member(".//./x"), "x");
    }
}
