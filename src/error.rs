use std::path::PathBuf;
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors surfaced by the script cache and service layer
///
/// None of these are fatal: each is scoped to the single operation that
/// produced it.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// The script file does not exist (any stale cache entry was purged)
    #[error("script {} not found", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be compiled; nothing was cached
    #[error("error loading script {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },

    /// The script loaded but has no such member
    #[error("method {member} not found in script {}: {source}", path.display())]
    MethodNotFound {
        path: PathBuf,
        member: String,
        #[source]
        source: RuntimeError,
    },

    /// The script's constructor failed
    #[error("error creating instance of {}: {source}", path.display())]
    Construction {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },

    /// The member ran and raised an error
    #[error("error executing method {member} of {}: {source}", path.display())]
    Invocation {
        path: PathBuf,
        member: String,
        #[source]
        source: RuntimeError,
    },
}

impl ScriptError {
    /// Path of the script the error relates to
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::NotFound(path)
            | Self::Load { path, .. }
            | Self::MethodNotFound { path, .. }
            | Self::Construction { path, .. }
            | Self::Invocation { path, .. } => path,
        }
    }

    /// Short machine-readable kind, used in logs and wire responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Load { .. } => "load_error",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::Construction { .. } => "construction_error",
            Self::Invocation { .. } => "invocation_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ScriptError::NotFound(PathBuf::from("/app/a.lua"));
        assert_eq!(err.to_string(), "script /app/a.lua not found");
        assert_eq!(err.kind(), "not_found");
        assert!(err.is_not_found());

        let err = ScriptError::Invocation {
            path: PathBuf::from("/app/a.lua"),
            member: "run".to_string(),
            source: RuntimeError::new("boom"),
        };
        assert_eq!(
            err.to_string(),
            "error executing method run of /app/a.lua: boom"
        );
        assert_eq!(err.path(), std::path::Path::new("/app/a.lua"));
        assert!(!err.is_not_found());
    }
}
