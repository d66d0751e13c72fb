use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to load email template {path}: {source}")]
    TemplateLoad { path: PathBuf, #[source] source: std::io::Error },
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("template substitution failed: {0}")]
    Template(String),
    #[error("css inlining failed: {0}")]
    Pipeline(String),
    #[error("css inlining cancelled")]
    Cancelled,
    #[error("i/o error on {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse history {path}: {source}")]
    History { path: PathBuf, #[source] source: serde_json::Error },
}
