use std::error::Error;

/// Base trait for all application errors
pub trait ConfactorError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error should be logged as an error or warning
    fn is_user_error(&self) -> bool {
        false
    }
}

/// Errors in the caller-authored spec tree.
///
/// These are programmer errors: they surface synchronously from `build`
/// rather than through the completion gate.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("Duplicate key '{key}' at '{path}' in spec tree")]
    DuplicateKey { path: String, key: String },

    #[error("Scalar binding '{path}' declares an endpoint default")]
    InvalidDefault { path: String },
}

impl ConfactorError for SpecError {
    fn error_code(&self) -> &'static str {
        match self {
            SpecError::DuplicateKey { .. } => "SPEC_DUPLICATE_KEY",
            SpecError::InvalidDefault { .. } => "SPEC_INVALID_DEFAULT",
        }
    }

    fn is_user_error(&self) -> bool {
        true
    }
}

/// Errors reported by a registry collaborator.
///
/// Never fatal to a build: probe failure degrades the whole build to
/// env/default resolution, and per-event lookup failures fall back to the
/// affected leaf's default.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry unreachable: {message}")]
    Unreachable { message: String },

    #[error("Registry lookup failed for '{key}': {message}")]
    LookupFailed { key: String, message: String },
}

impl ConfactorError for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            RegistryError::Unreachable { .. } => "REGISTRY_UNREACHABLE",
            RegistryError::LookupFailed { .. } => "REGISTRY_LOOKUP_FAILED",
        }
    }
}
