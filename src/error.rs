//! Crate-wide error taxonomy.
//!
//! One enum covers every failure the pipeline can surface. Recoverable
//! conditions (per-segment CIGAR mismatches inside the segmented aligner) are
//! handled locally and never reach callers; everything else propagates to the
//! orchestrator, which closes its writers and exits non-zero with a single
//! diagnostic line.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors produced by the MSA pipeline and its supporting components.
#[derive(Debug)]
pub enum MsaError {
    /// Invalid parameter or configuration (k out of range, mismatched sketch
    /// k, bad CIGAR op, length overflow, malformed command template).
    InvalidArgument(String),

    /// I/O failure with the path (or stream description) it occurred on.
    Io { context: String, source: io::Error },

    /// Malformed FASTA/SAM/CIGAR input.
    Parse { context: String },

    /// A CIGAR consumed the wrong number of bases for its sequence pair.
    AlignmentInconsistency { context: String },

    /// The external MSA subprocess exited non-zero.
    ExternalTool {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

impl MsaError {
    /// Attach a path context to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MsaError::Io {
            context: path.into().display().to_string(),
            source,
        }
    }

    pub fn parse(context: impl Into<String>) -> Self {
        MsaError::Parse {
            context: context.into(),
        }
    }

    pub fn invalid(context: impl Into<String>) -> Self {
        MsaError::InvalidArgument(context.into())
    }
}

impl fmt::Display for MsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsaError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            MsaError::Io { context, source } => write!(f, "I/O error: {}: {}", context, source),
            MsaError::Parse { context } => write!(f, "parse error: {}", context),
            MsaError::AlignmentInconsistency { context } => {
                write!(f, "alignment inconsistency: {}", context)
            }
            MsaError::ExternalTool {
                command,
                status,
                stderr,
            } => match status {
                Some(code) => write!(
                    f,
                    "external tool failed (exit {}): {}: {}",
                    code,
                    command,
                    stderr.trim_end()
                ),
                None => write!(
                    f,
                    "external tool terminated by signal: {}: {}",
                    command,
                    stderr.trim_end()
                ),
            },
        }
    }
}

impl std::error::Error for MsaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MsaError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for MsaError {
    fn from(err: io::Error) -> Self {
        MsaError::Io {
            context: "stream".to_string(),
            source: err,
        }
    }
}

pub type Result<T> = std::result::Result<T, MsaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_argument() {
        let err = MsaError::invalid("k must be in 1..=31");
        assert_eq!(format!("{}", err), "invalid argument: k must be in 1..=31");
    }

    #[test]
    fn test_display_external_tool() {
        let err = MsaError::ExternalTool {
            command: "mafft in.fa".to_string(),
            status: Some(2),
            stderr: "cannot open in.fa\n".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("exit 2"));
        assert!(msg.contains("cannot open in.fa"));
    }

    #[test]
    fn test_io_source_preserved() {
        use std::error::Error;
        let err = MsaError::io("/tmp/x.fa", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert!(format!("{}", err).contains("/tmp/x.fa"));
    }
}
