use std::path::PathBuf;

use thiserror::Error;

/// The four failure classes a build can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required configuration field is missing or malformed.
    Validation,
    /// The input tree or a maintainer script does not exist.
    NotFound,
    /// Reading the source tree or writing an archive failed.
    Io,
    /// The scratch directory could not be removed.
    Cleanup,
}

/// The primary error type for all operations in the `ipkbuild` crate.
#[derive(Debug, Error)]
pub enum IpkError {
    /// A configuration field failed validation. Nothing was written.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// A path that must exist was not found.
    #[error("{what} not found: '{}'", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An archive sink failed to take an entry. Covers both reading the
    /// entry's content and writing it out.
    #[error("failed to write entry '{entry}' to '{}': {source}", archive.display())]
    Entry {
        archive: PathBuf,
        entry: String,
        #[source]
        source: std::io::Error,
    },

    /// The tree contains something that cannot be represented as an entry.
    #[error("cannot archive '{}': {reason}", path.display())]
    Unarchivable { path: PathBuf, reason: String },

    /// Removing the scratch directory failed after a successful build.
    #[error("failed to remove scratch directory '{}': {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The build failed and removing the scratch directory failed as well.
    /// `primary` is the build error; `cleanup` is reported alongside it.
    #[error("{primary} (additionally, removing scratch directory '{}' failed: {cleanup})", path.display())]
    CleanupAfterFailure {
        #[source]
        primary: Box<IpkError>,
        path: PathBuf,
        cleanup: std::io::Error,
    },

    /// The build failed and the partially written package could not be
    /// removed from the output directory.
    #[error("{primary} (additionally, partial package '{}' could not be removed: {cleanup})", path.display())]
    PartialOutputLeft {
        #[source]
        primary: Box<IpkError>,
        path: PathBuf,
        cleanup: std::io::Error,
    },
}

impl IpkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IpkError::Io { path: path.into(), source }
    }

    /// Maps the error onto its failure class. An error that carries a
    /// cleanup failure on top of a build failure reports the build failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IpkError::Validation(_) => ErrorKind::Validation,
            IpkError::NotFound { .. } => ErrorKind::NotFound,
            IpkError::Io { .. } | IpkError::Entry { .. } | IpkError::Unarchivable { .. } => ErrorKind::Io,
            IpkError::Cleanup { .. } => ErrorKind::Cleanup,
            IpkError::CleanupAfterFailure { primary, .. } | IpkError::PartialOutputLeft { primary, .. } => {
                primary.kind()
            }
        }
    }

    /// The build error this one wraps, or `self` when there is nothing wrapped.
    pub fn primary(&self) -> &IpkError {
        match self {
            IpkError::CleanupAfterFailure { primary, .. } | IpkError::PartialOutputLeft { primary, .. } => {
                primary.primary()
            }
            other => other,
        }
    }

    /// True if removing the scratch directory or a partial package failed
    /// at some point.
    pub fn has_cleanup_failure(&self) -> bool {
        matches!(
            self,
            IpkError::Cleanup { .. } | IpkError::CleanupAfterFailure { .. } | IpkError::PartialOutputLeft { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_cleanup_after_failure_keeps_primary() {
        let primary = IpkError::NotFound { what: "input directory", path: PathBuf::from("/nope") };
        let err = IpkError::CleanupAfterFailure {
            primary: Box::new(primary),
            path: PathBuf::from("/tmp/scratch"),
            cleanup: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.has_cleanup_failure());
        assert!(matches!(err.primary(), IpkError::NotFound { .. }));

        let text = err.to_string();
        assert!(text.starts_with("input directory not found: '/nope'"), "{text}");
        assert!(text.contains("/tmp/scratch"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(IpkError::Validation("x".into()).kind(), ErrorKind::Validation);
        let io_err = IpkError::io("/a", io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(io_err.kind(), ErrorKind::Io);
        assert!(!io_err.has_cleanup_failure());
        let cleanup = IpkError::Cleanup { path: "/s".into(), source: io::Error::new(io::ErrorKind::Other, "busy") };
        assert_eq!(cleanup.kind(), ErrorKind::Cleanup);
    }
}
