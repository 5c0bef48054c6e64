//! # Remora Testkit
//!
//! Test utilities for Remora.
//!
//! This crate provides:
//! - A test context wired to inspectable in-memory controllers
//! - A queue gate for holding operations before they start
//! - A file controller that records call start and finish times
//! - Fake authentication collaborators
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use remora_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn saves_once() {
//!     let tc = TestContext::new();
//!     let file = RemoteFile::from_data(&tc, &b"data"[..]).unwrap();
//!     file.save().await.unwrap();
//!     assert_eq!(tc.files.call_count(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod controllers;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::*;
    pub use crate::controllers::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use auth::*;
pub use controllers::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;
