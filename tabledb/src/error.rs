use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableDbError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid placeholder: {0}")]
    InvalidPlaceholder(String),

    #[error("Serial id overflow at '{0}'")]
    SerialOverflow(String),

    #[error("Invalid sort order '{0}' (expected <field>_asc|desc[_nullish_first|_nullish_last])")]
    InvalidSortOrder(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table '{table}' is not a {expected} table")]
    TableKind { table: String, expected: &'static str },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TableDbError>;
