use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the compilation layer.
///
/// Platform adapters raise these abstractly; the orchestrator attaches
/// the adapter name and target before handing them to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid target `{0}`: not an existing path nor a recognizable address")]
    InvalidTarget(String),

    #[error("no platform detected for `{0}`")]
    NoPlatformDetected(String),

    #[error("compiler not found: {0}")]
    CompilerNotFound(String),

    #[error("compilation failed:\n{}", diagnostics.join("\n"))]
    CompilationFailed { diagnostics: Vec<String> },

    #[error("compiler crashed (exit code {exit_code:?}): {stderr}")]
    CompilerCrashed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("unresolved library `{0}`")]
    UnresolvedLibrary(String),

    #[error("source code not verified for `{0}`")]
    SourceNotVerified(String),

    #[error("network error: {0:#}")]
    Network(#[source] anyhow::Error),

    #[error("ambiguous contract `{contract}`: conflicting definitions in `{first}` and `{second}`")]
    ContractAmbiguous {
        contract: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("invalid archive `{path}`: {reason}")]
    InvalidArchive { path: String, reason: String },

    #[error("platform `{platform}` failed on `{target}`: {source}")]
    Platform {
        platform: &'static str,
        target: String,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Wraps an error with the adapter name and the target it was
    /// working on. Already-wrapped errors are returned untouched so the
    /// outermost adapter wins.
    pub fn with_platform(self, platform: &'static str, target: impl Into<String>) -> Self {
        match self {
            err @ Error::Platform { .. } => err,
            err => Error::Platform {
                platform,
                target: target.into(),
                source: Box::new(err),
            },
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
