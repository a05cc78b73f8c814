use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid {kind} name `{name}`: {reason}")]
    #[diagnostic(code(registry::invalid_name))]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("invalid element path `{input}`: {message}")]
    #[diagnostic(code(registry::invalid_path))]
    InvalidPath { input: String, message: String },

    #[error("element `{name}` already exists in this registry")]
    #[diagnostic(code(registry::name_conflict))]
    NameConflict { name: String },

    #[error("element `{name}` not found")]
    #[diagnostic(code(registry::not_found))]
    NotFound { name: String },

    #[error("export `{export}` names unknown element `{element}`")]
    #[diagnostic(code(registry::unknown_export_target))]
    UnknownExportTarget { export: String, element: String },

    #[error("registry document schema mismatch: expected `{expected}`, got `{actual}`")]
    #[diagnostic(code(registry::schema_mismatch))]
    SchemaMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("unsupported registry version {version} (supported up to {supported})")]
    #[diagnostic(code(registry::unsupported_version))]
    UnsupportedVersion { version: u32, supported: u32 },

    #[error("json error: {0}")]
    #[diagnostic(code(registry::json_error))]
    Json(#[from] serde_json::Error),
}

/// Failures raised while reading or writing an [`Archive`](crate::archive::Archive).
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ArchiveError {
    #[error("expected tag `{expected}`, found {found}")]
    #[diagnostic(code(registry::archive::tag_mismatch))]
    TagMismatch { expected: String, found: String },

    #[error("expected {expected} value, found {found}")]
    #[diagnostic(code(registry::archive::type_mismatch))]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("unexpected end of archive")]
    #[diagnostic(code(registry::archive::unexpected_end))]
    UnexpectedEnd,

    #[error("invalid archived data: {0}")]
    #[diagnostic(code(registry::archive::invalid_data))]
    InvalidData(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] Error),
}
