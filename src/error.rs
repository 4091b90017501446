use thiserror::Error;

use crate::parse::ParseError;
use crate::types::{BuildError, CompileError, ModifyError, TableError};

/// Unified error type covering every stage from rule text to modified table.
///
/// Returned by convenience methods like
/// [`Modifier::from_dsl()`](crate::Modifier::from_dsl) and
/// [`Modifier::modify()`](crate::Modifier::modify).
#[derive(Debug, Error)]
pub enum RemodelError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Modify(#[from] ModifyError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}
