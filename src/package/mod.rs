//! # Package Assembly
//!
//! Turns a data tree plus [`PackageMetadata`] into a single `.ipk` file in
//! four sequential stages, each producing one path in the scratch directory:
//!
//! 1. `debian-binary`, the version marker (`2.0\n`);
//! 2. `control.tar.gz`, built from a staged control directory;
//! 3. `data.tar.gz`, built from the data tree;
//! 4. the outer, uncompressed tar holding the three files above, written
//!    to the output directory.
//!
//! The scratch directory is removed after the build whether it succeeded or
//! not. A failure to remove it is reported, never swallowed, and never hides
//! an earlier build error.

pub mod control;

pub use control::{render_control, stage_control_dir, CONTROL_FILE};

use crate::archive::{ChildOrder, Compression, TarSink, TreeSerializer};
use crate::common::{PackageMetadata, RootPolicy};
use crate::fsx::set_unix_permissions;
use crate::IpkError;

use chrono::{DateTime, Local, TimeZone};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the version marker member.
pub const DEBIAN_BINARY: &str = "debian-binary";
/// Content of the version marker member.
pub const DEBIAN_BINARY_CONTENT: &[u8] = b"2.0\n";
/// Name of the compressed control archive member.
pub const CONTROL_ARCHIVE: &str = "control.tar.gz";
/// Name of the compressed data archive member.
pub const DATA_ARCHIVE: &str = "data.tar.gz";

const CONTROL_STAGING_DIR: &str = "control";
const MARKER_MODE: u32 = 0o644;

/// The single instant a build is stamped with: it names the package file
/// and becomes the mtime of every archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTimestamp {
    instant: DateTime<Local>,
}

impl BuildTimestamp {
    pub fn now() -> Self {
        Self { instant: Local::now() }
    }

    /// Seconds since the Unix epoch, e.g. from `SOURCE_DATE_EPOCH`.
    pub fn from_unix(secs: i64) -> Result<Self, IpkError> {
        if secs < 0 {
            return Err(IpkError::Validation(format!("timestamp {secs} is before the Unix epoch")));
        }
        let instant = Local
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| IpkError::Validation(format!("timestamp {secs} is out of range")))?;
        Ok(Self { instant })
    }

    /// `yyMMddHHmm` in the local clock, as used in the package file name.
    pub fn file_stamp(&self) -> String {
        self.instant.format("%y%m%d%H%M").to_string()
    }

    /// Seconds since the Unix epoch, for tar headers.
    pub fn mtime(&self) -> u64 {
        u64::try_from(self.instant.timestamp()).unwrap_or(0)
    }
}

/// `<name>-<version>-<yyMMddHHmm>-<arch>.ipk`
pub fn package_file_name(metadata: &PackageMetadata, timestamp: &BuildTimestamp) -> String {
    format!(
        "{}-{}-{}-{}.ipk",
        metadata.name(),
        metadata.version(),
        timestamp.file_stamp(),
        metadata.architecture()
    )
}

/// Runs the build stages for one package. Owns the scratch directory for
/// the duration of the build; two assemblers must never share one.
pub struct PackageAssembler<'a> {
    metadata: &'a PackageMetadata,
    scratch_dir: &'a Path,
    timestamp: BuildTimestamp,
    compression: Compression,
}

impl<'a> PackageAssembler<'a> {
    pub fn new(metadata: &'a PackageMetadata, scratch_dir: &'a Path, timestamp: BuildTimestamp) -> Self {
        Self { metadata, scratch_dir, timestamp, compression: Compression::GZIP_DEFAULT }
    }

    /// Compression for the control and data archives. The outer container
    /// is never compressed.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Stage 1: the version marker.
    pub fn write_version_marker(&self) -> Result<PathBuf, IpkError> {
        info!("writing {DEBIAN_BINARY}");
        let path = self.scratch_dir.join(DEBIAN_BINARY);
        fs::write(&path, DEBIAN_BINARY_CONTENT).map_err(|e| IpkError::io(&path, e))?;
        set_unix_permissions(&path, MARKER_MODE).map_err(|e| IpkError::io(&path, e))?;
        debug!(path = %path.display(), "version marker written");
        Ok(path)
    }

    /// Stage 2: stage the control directory, archive it, drop the staging copy.
    pub fn build_control_archive(&self) -> Result<PathBuf, IpkError> {
        info!("building {CONTROL_ARCHIVE}");
        let staging = self.scratch_dir.join(CONTROL_STAGING_DIR);
        stage_control_dir(self.metadata, &staging)?;

        let target = self.scratch_dir.join(CONTROL_ARCHIVE);
        self.archive_tree(&staging, &target)?;

        fs::remove_dir_all(&staging).map_err(|e| IpkError::io(&staging, e))?;
        debug!(path = %target.display(), "control archive written");
        Ok(target)
    }

    /// Stage 3: archive the data tree.
    pub fn build_data_archive(&self, data_root: &Path) -> Result<PathBuf, IpkError> {
        info!(input = %data_root.display(), "building {DATA_ARCHIVE}");
        let target = self.scratch_dir.join(DATA_ARCHIVE);
        self.archive_tree(data_root, &target)?;
        debug!(path = %target.display(), "data archive written");
        Ok(target)
    }

    /// Stage 4: pack the scratch directory into the final container at
    /// `output`. A partially written container is removed on failure.
    pub fn build_container(&self, output: &Path) -> Result<PathBuf, IpkError> {
        info!(output = %output.display(), "building package container");
        let order = ChildOrder::Ranked(vec![
            DEBIAN_BINARY.to_string(),
            CONTROL_ARCHIVE.to_string(),
            DATA_ARCHIVE.to_string(),
        ]);
        // nothing to discard until the container file exists
        let mut sink = TarSink::create(output, Compression::None, self.timestamp.mtime())?;
        let written = match TreeSerializer::new(RootPolicy::Transparent)
            .with_order(order)
            .serialize(self.scratch_dir, &mut sink)
        {
            Ok(_) => sink.finish().map(|_| ()),
            Err(e) => {
                drop(sink);
                Err(e)
            }
        };
        match written {
            Ok(()) => Ok(output.to_path_buf()),
            Err(primary) => Err(discard_partial(output, primary)),
        }
    }

    /// Runs all four stages. Does not touch the scratch directory's
    /// existence; see [`build_package`] for the full lifecycle.
    pub fn assemble(&self, data_root: &Path, output_dir: &Path) -> Result<PathBuf, IpkError> {
        self.write_version_marker()?;
        self.build_control_archive()?;
        self.build_data_archive(data_root)?;
        let output = output_dir.join(package_file_name(self.metadata, &self.timestamp));
        self.build_container(&output)
    }

    /// Writes `root` as a marked-root sub-archive at `target`.
    fn archive_tree(&self, root: &Path, target: &Path) -> Result<(), IpkError> {
        let mut sink = TarSink::create(target, self.compression, self.timestamp.mtime())?;
        TreeSerializer::new(RootPolicy::Marked).serialize(root, &mut sink)?;
        sink.finish()?;
        Ok(())
    }
}

/// Builds `<name>-<version>-<stamp>-<arch>.ipk` in `output_dir` from the
/// tree at `data_root`, using `scratch_dir` for intermediate files.
///
/// Everything that can be checked up front (input tree, scripts, scratch and
/// output locations) is checked before anything is written. `scratch_dir`
/// must be absent or empty; it is created here and removed before returning.
pub fn build_package(
    metadata: &PackageMetadata,
    data_root: &Path,
    scratch_dir: &Path,
    output_dir: &Path,
    timestamp: BuildTimestamp,
) -> Result<PathBuf, IpkError> {
    preflight(metadata, data_root, scratch_dir, output_dir)?;

    fs::create_dir_all(output_dir).map_err(|e| IpkError::io(output_dir, e))?;
    fs::create_dir_all(scratch_dir).map_err(|e| IpkError::io(scratch_dir, e))?;

    let result = PackageAssembler::new(metadata, scratch_dir, timestamp).assemble(data_root, output_dir);
    let cleanup = fs::remove_dir_all(scratch_dir);
    match (result, cleanup) {
        (Ok(path), Ok(())) => {
            info!(package = %path.display(), "package built");
            Ok(path)
        }
        (Ok(path), Err(source)) => {
            // the package itself is complete; only the scratch area is left behind
            warn!(package = %path.display(), "package built but scratch directory was not removed");
            Err(IpkError::Cleanup { path: scratch_dir.to_path_buf(), source })
        }
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(cleanup)) => Err(IpkError::CleanupAfterFailure {
            primary: Box::new(primary),
            path: scratch_dir.to_path_buf(),
            cleanup,
        }),
    }
}

fn preflight(metadata: &PackageMetadata, data_root: &Path, scratch_dir: &Path, output_dir: &Path) -> Result<(), IpkError> {
    match fs::metadata(data_root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(IpkError::Validation(format!("input '{}' is not a directory", data_root.display())));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(IpkError::NotFound { what: "input directory", path: data_root.to_path_buf() });
        }
        Err(e) => return Err(IpkError::io(data_root, e)),
    }

    for (kind, script) in metadata.scripts().iter() {
        match fs::metadata(script) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(IpkError::Validation(format!(
                    "{} script '{}' is not a regular file",
                    kind.canonical_name(),
                    script.display()
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(IpkError::NotFound { what: "maintainer script", path: script.to_path_buf() });
            }
            Err(e) => return Err(IpkError::io(script, e)),
        }
    }

    match fs::read_dir(scratch_dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(IpkError::Validation(format!(
                    "scratch directory '{}' is not empty",
                    scratch_dir.display()
                )));
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(IpkError::io(scratch_dir, e)),
    }

    let data_root = lenient_canonical(data_root);
    let scratch = lenient_canonical(scratch_dir);
    let output = lenient_canonical(output_dir);
    if scratch.starts_with(&data_root) {
        return Err(IpkError::Validation("scratch directory must not be inside the input tree".into()));
    }
    if output.starts_with(&data_root) {
        return Err(IpkError::Validation("output directory must not be inside the input tree".into()));
    }
    if output.starts_with(&scratch) {
        return Err(IpkError::Validation("output directory must not be inside the scratch directory".into()));
    }
    Ok(())
}

/// Canonicalizes the longest existing prefix of `path` and appends the rest.
fn lenient_canonical(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(resolved) = fs::canonicalize(current) {
            return missing.iter().rev().fold(resolved, |acc: PathBuf, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Removes a half-written package and returns the error to report. A
/// package that cannot be removed is reported together with `primary`.
fn discard_partial(output: &Path, primary: IpkError) -> IpkError {
    match fs::remove_file(output) {
        Ok(()) => {
            debug!(path = %output.display(), "removed partial package");
            primary
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => primary,
        Err(cleanup) => {
            warn!(path = %output.display(), error = %cleanup, "could not remove partial package");
            IpkError::PartialOutputLeft { primary: Box::new(primary), path: output.to_path_buf(), cleanup }
        }
    }
}
