use thiserror::Error;

use crate::{authority::error::AuthorityError, field::error::FieldError};

/// Errors that can occur while building or syncing a replicated object
#[derive(Debug, Error)]
pub enum ObjectError {
    /// More fields were declared than a field mask can address
    #[error("Object {object} declares {count} fields, at most {max} are supported")]
    TooManyFields {
        object: String,
        count: usize,
        max: usize,
    },

    #[error("Object {object} declares field '{name}' twice")]
    DuplicateFieldName { object: String, name: &'static str },

    /// An update referenced a field index the object does not declare
    #[error("Object {object} has no field {field}")]
    UnknownField { object: String, field: String },

    /// Dirty fields were flushed before the host told us the authority epoch
    #[error("Object {object} has no authority epoch yet, cannot stamp updates")]
    NoAuthorityEpoch { object: String },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Authority(#[from] AuthorityError),
}
