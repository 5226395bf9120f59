use std::fmt;

/// A layer, source or control definition the store refuses to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    EmptyId,
    EmptyType { id: String },
    MissingField { id: String, field: &'static str },
    InvalidField {
        id: String,
        field: &'static str,
        reason: String,
    },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionError::EmptyId => write!(f, "Definition id must not be empty"),
            DefinitionError::EmptyType { id } => write!(f, "Definition {id} has no type"),
            DefinitionError::MissingField { id, field } => {
                write!(f, "Definition {id} is missing required field {field}")
            }
            DefinitionError::InvalidField { id, field, reason } => {
                write!(f, "Definition {id} has invalid {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for DefinitionError {}
