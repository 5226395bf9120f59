use std::fmt;

use formats::ExportError;
use scene::{BackendKind, DefinitionError};

#[derive(Debug)]
pub enum WidgetError {
    /// Rejected before it reached the store or the queue.
    InvalidDefinition(DefinitionError),
    /// The operation needs an attached surface.
    NotConnected,
    /// The session's backend has no such feature.
    Unsupported {
        operation: &'static str,
        backend: BackendKind,
    },
    Export(ExportError),
}

impl fmt::Display for WidgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetError::InvalidDefinition(err) => write!(f, "Invalid definition: {err}"),
            WidgetError::NotConnected => f.write_str("No surface attached"),
            WidgetError::Unsupported { operation, backend } => {
                write!(f, "{operation} is not available on {backend}")
            }
            WidgetError::Export(err) => write!(f, "Export failed: {err}"),
        }
    }
}

impl std::error::Error for WidgetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WidgetError::InvalidDefinition(err) => Some(err),
            WidgetError::NotConnected | WidgetError::Unsupported { .. } => None,
            WidgetError::Export(err) => Some(err),
        }
    }
}

impl From<DefinitionError> for WidgetError {
    fn from(err: DefinitionError) -> Self {
        WidgetError::InvalidDefinition(err)
    }
}

impl From<ExportError> for WidgetError {
    fn from(err: ExportError) -> Self {
        WidgetError::Export(err)
    }
}
