//! # Remora Codec
//!
//! Value model and JSON wire encoding for Remora.
//!
//! Values stored on remote entities are converted into JSON documents by an
//! [`Encoder`]. Each encoder only decides how references to other entities
//! are written; every other value kind has one fixed wire form:
//!
//! - Dates: `{"__type": "Date", "iso": "YYYY-MM-DDTHH:MM:SS.sssZ"}`
//! - Bytes: `{"__type": "Bytes", "base64": ...}`
//! - Pointers: `{"__type": "Pointer", "className": ..., "objectId": ...}`
//! - Field operations: `{"__op": ..., ...}`
//! - Maps keep their insertion order
//!
//! ## Usage
//!
//! ```
//! use remora_codec::{decode, Encoder, EntityRef, PointerEncoder, Value};
//!
//! let value = Value::map([
//!     ("title", Value::from("hello")),
//!     ("author", Value::Pointer(EntityRef::saved("_User", "u1"))),
//! ]);
//! let doc = PointerEncoder.encode(&value).unwrap();
//! assert_eq!(doc["author"]["objectId"], "u1");
//!
//! assert_eq!(decode(&doc).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod acl;
mod date;
mod decoder;
mod encoder;
mod error;
mod geo;
mod operation;
mod reference;
mod value;

pub use acl::{Acl, Permissions};
pub use date::{format_date, parse_date};
pub use decoder::{decode, Decoder};
pub use encoder::{Document, Encoder, NoObjectsEncoder, PointerEncoder, PointerOrLocalIdEncoder};
pub use error::{CodecError, CodecResult};
pub use geo::GeoPoint;
pub use operation::{FieldOperation, Number};
pub use reference::{EntityRef, FileRef, Relation};
pub use value::{OpaqueValue, Value};
