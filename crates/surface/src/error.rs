use std::fmt;

use scene::DefinitionError;

/// Failure reported by a rendering backend primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    NotCreated,
    InvalidDefinition(DefinitionError),
    DuplicateId(String),
    UnknownLayer(String),
    DanglingSource { layer: String, source: String },
    Rejected(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NotCreated => write!(f, "Backend instance has not been created"),
            BackendError::InvalidDefinition(err) => write!(f, "{err}"),
            BackendError::DuplicateId(id) => write!(f, "Id already in use: {id}"),
            BackendError::UnknownLayer(id) => write!(f, "Unknown layer: {id}"),
            BackendError::DanglingSource { layer, source } => {
                write!(f, "Layer {layer} references missing source {source}")
            }
            BackendError::Rejected(reason) => write!(f, "Rejected by backend: {reason}"),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::InvalidDefinition(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DefinitionError> for BackendError {
    fn from(err: DefinitionError) -> Self {
        BackendError::InvalidDefinition(err)
    }
}

/// Why one call record or snapshot entry was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    MissingArgument { method: String, index: usize },
    Malformed { method: String, reason: String },
    Backend(BackendError),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyError::MissingArgument { method, index } => {
                write!(f, "{method}: missing argument {index}")
            }
            ApplyError::Malformed { method, reason } => write!(f, "{method}: {reason}"),
            ApplyError::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplyError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for ApplyError {
    fn from(err: BackendError) -> Self {
        ApplyError::Backend(err)
    }
}

impl From<DefinitionError> for ApplyError {
    fn from(err: DefinitionError) -> Self {
        ApplyError::Backend(BackendError::InvalidDefinition(err))
    }
}
