//! Common types shared by the tree serializer and the package assembler.

use crate::IpkError;
use std::path::{Path, PathBuf};

/// The four optional lifecycle scripts of an IPK control archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    PreInst,
    PostInst,
    PreRm,
    PostRm,
}

impl ScriptKind {
    /// All kinds, in the order they are staged.
    pub const ALL: [ScriptKind; 4] = [
        ScriptKind::PreInst,
        ScriptKind::PostInst,
        ScriptKind::PreRm,
        ScriptKind::PostRm,
    ];

    /// The file name the installer looks for inside the control archive.
    pub fn canonical_name(self) -> &'static str {
        match self {
            ScriptKind::PreInst => "preinst",
            ScriptKind::PostInst => "postinst",
            ScriptKind::PreRm => "prerm",
            ScriptKind::PostRm => "postrm",
        }
    }
}

/// Source paths of the maintainer scripts. Unset scripts are left out of
/// the control archive entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintainerScripts {
    pub preinst: Option<PathBuf>,
    pub postinst: Option<PathBuf>,
    pub prerm: Option<PathBuf>,
    pub postrm: Option<PathBuf>,
}

impl MaintainerScripts {
    pub fn get(&self, kind: ScriptKind) -> Option<&Path> {
        match kind {
            ScriptKind::PreInst => self.preinst.as_deref(),
            ScriptKind::PostInst => self.postinst.as_deref(),
            ScriptKind::PreRm => self.prerm.as_deref(),
            ScriptKind::PostRm => self.postrm.as_deref(),
        }
    }

    /// Supplied scripts as `(kind, source path)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ScriptKind, &Path)> + '_ {
        ScriptKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|path| (kind, path)))
    }
}

/// Package metadata rendered into the `control` file.
///
/// Built once through [`PackageMetadata::new`], which rejects values that
/// would corrupt the control file or the package file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    name: String,
    version: String,
    architecture: String,
    depends: Option<String>,
    maintainer: Option<String>,
    description: Option<String>,
    scripts: MaintainerScripts,
}

impl PackageMetadata {
    /// Validates and builds the metadata record.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Result<Self, IpkError> {
        let name = name.into();
        let version = version.into();
        let architecture = architecture.into();
        for (field, value) in [("name", &name), ("version", &version), ("arch", &architecture)] {
            check_required(field, value)?;
        }
        Ok(Self {
            name,
            version,
            architecture,
            depends: None,
            maintainer: None,
            description: None,
            scripts: MaintainerScripts::default(),
        })
    }

    pub fn with_depends(mut self, depends: impl Into<String>) -> Result<Self, IpkError> {
        self.depends = Some(check_single_line("depends", depends.into())?);
        Ok(self)
    }

    pub fn with_maintainer(mut self, maintainer: impl Into<String>) -> Result<Self, IpkError> {
        self.maintainer = Some(check_single_line("maintainer", maintainer.into())?);
        Ok(self)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Result<Self, IpkError> {
        self.description = Some(check_single_line("description", description.into())?);
        Ok(self)
    }

    pub fn with_script(mut self, kind: ScriptKind, path: impl Into<PathBuf>) -> Self {
        let path = Some(path.into());
        match kind {
            ScriptKind::PreInst => self.scripts.preinst = path,
            ScriptKind::PostInst => self.scripts.postinst = path,
            ScriptKind::PreRm => self.scripts.prerm = path,
            ScriptKind::PostRm => self.scripts.postrm = path,
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn depends(&self) -> Option<&str> {
        self.depends.as_deref()
    }

    pub fn maintainer(&self) -> Option<&str> {
        self.maintainer.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn scripts(&self) -> &MaintainerScripts {
        &self.scripts
    }
}

fn check_single_line(field: &str, value: String) -> Result<String, IpkError> {
    if value.contains(['\n', '\r']) {
        return Err(IpkError::Validation(format!("{field} must not contain a line break")));
    }
    Ok(value)
}

// name, version and arch also end up in the package file name
fn check_required(field: &str, value: &str) -> Result<(), IpkError> {
    if value.is_empty() {
        return Err(IpkError::Validation(format!("{field} is required")));
    }
    if value.contains(['\n', '\r']) {
        return Err(IpkError::Validation(format!("{field} must not contain a line break")));
    }
    if value.contains(['/', '\\']) {
        return Err(IpkError::Validation(format!("{field} must not contain a path separator")));
    }
    Ok(())
}

/// Kind of a single archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One normalized entry, as handed to an [`EntrySink`](crate::archive::EntrySink).
///
/// Owner and group are not carried: every sink writes them as `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub kind: EntryKind,
    /// `/`-joined path relative to the walk root, or `"."` for a marked root.
    pub name: String,
    /// Permission bits from the three-flag model in [`crate::fsx::entry_mode`].
    pub mode: u32,
}

impl ArchiveEntry {
    pub fn directory(name: impl Into<String>, mode: u32) -> Self {
        Self { kind: EntryKind::Directory, name: name.into(), mode }
    }

    pub fn file(name: impl Into<String>, mode: u32) -> Self {
        Self { kind: EntryKind::File, name: name.into(), mode }
    }
}

/// How the top-level directory of a walk shows up in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPolicy {
    /// The root is written as a directory entry named `"."`; its children
    /// follow under bare names. Used for `control.tar.gz` and `data.tar.gz`.
    Marked,
    /// The root has no entry; its children are written at the top level.
    /// Used for the outer `.ipk` container.
    Transparent,
}

/// Name of the entry that stands for a marked root.
pub const ROOT_ENTRY_NAME: &str = ".";
