//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding, decoding, or applying field operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value with no wire encoding rule was supplied.
    #[error("unsupported value type: {type_name}")]
    UnsupportedValueType {
        /// Runtime type name of the offending value.
        type_name: String,
    },

    /// NaN and infinities have no JSON representation.
    #[error("non-finite numbers cannot be encoded")]
    NonFiniteNumber,

    /// A reference to an entity that has not been saved yet.
    #[error("cannot encode a reference to an unsaved {class_name}")]
    UnsavedReference {
        /// Class of the unsaved entity.
        class_name: String,
    },

    /// The active encoder does not accept entity references at all.
    #[error("entity references are not allowed here (found {class_name})")]
    ReferencesNotAllowed {
        /// Class of the rejected entity.
        class_name: String,
    },

    /// Latitude or longitude out of range.
    #[error("invalid geo point: {message}")]
    InvalidGeoPoint {
        /// Description of the range violation.
        message: String,
    },

    /// Malformed access control list.
    #[error("invalid ACL: {message}")]
    InvalidAcl {
        /// Description of the problem.
        message: String,
    },

    /// A field operation cannot be merged with or applied to the given value.
    #[error("invalid field operation: {message}")]
    InvalidOperation {
        /// Description of the incompatibility.
        message: String,
    },

    /// Failed to decode a wire document.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// The document nests deeper than the decoder accepts.
    #[error("document nested deeper than {max_depth} levels")]
    DepthExceeded {
        /// Configured nesting limit.
        max_depth: usize,
    },

    /// A `__type` or `__op` tag the decoder does not know.
    #[error("unknown type tag: {tag}")]
    UnknownTypeTag {
        /// The tag as it appeared on the wire.
        tag: String,
    },
}

impl CodecError {
    /// Create an unsupported value type error.
    pub fn unsupported_value_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedValueType {
            type_name: type_name.into(),
        }
    }

    /// Create an unsaved reference error.
    pub fn unsaved_reference(class_name: impl Into<String>) -> Self {
        Self::UnsavedReference {
            class_name: class_name.into(),
        }
    }

    /// Create an invalid geo point error.
    pub fn invalid_geo_point(message: impl Into<String>) -> Self {
        Self::InvalidGeoPoint {
            message: message.into(),
        }
    }

    /// Create an invalid ACL error.
    pub fn invalid_acl(message: impl Into<String>) -> Self {
        Self::InvalidAcl {
            message: message.into(),
        }
    }

    /// Create an invalid field operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an unknown type tag error.
    pub fn unknown_type_tag(tag: impl Into<String>) -> Self {
        Self::UnknownTypeTag { tag: tag.into() }
    }
}
