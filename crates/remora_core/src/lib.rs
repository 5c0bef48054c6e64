//! # Remora Core
//!
//! Remote-backed files and objects for Remora.
//!
//! This crate provides:
//! - A per-entity operation queue with cooperative cancellation
//! - File and object facades that route saves, fetches and deletes
//!   through their queue
//! - Controller traits for the remote I/O, with in-memory implementations
//! - An authentication provider registry
//!
//! ## Ordering
//!
//! Every facade owns one [`OperationQueue`]. Operations on the same facade
//! start in call order and never overlap, and a failed or cancelled
//! operation still releases the next one. Operations on different facades
//! are independent.
//!
//! ## Cancellation
//!
//! Each queued operation gets a [`CancellationToken`]. Calling `cancel()` on
//! a facade fires the token of every operation that has not finished; a
//! caller-supplied token is linked as the parent. Controllers observe the
//! token and resolve with [`CoreError::Cancelled`].
//!
//! ```
//! use remora_core::{ClientConfig, Context, MemoryFileController, MemoryObjectController, RemoteFile};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> remora_core::CoreResult<()> {
//! let ctx = Context::builder(ClientConfig::new("app", "memory://"))
//!     .file_controller(Arc::new(MemoryFileController::new()))
//!     .object_controller(Arc::new(MemoryObjectController::new()))
//!     .build()?;
//!
//! let file = RemoteFile::new(&ctx, Some("hello.txt"), &b"hello"[..], None)?;
//! file.save().await?;
//! assert!(!file.is_dirty());
//! assert!(file.url().is_some());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod context;
mod controller;
mod error;
mod file;
mod memory;
mod object;
mod progress;
mod queue;

pub use auth::{AuthenticatedUser, AuthenticationManager, AuthenticationProvider, CurrentUserController};
pub use config::{ClientConfig, DEFAULT_FILE_NAME, DEFAULT_MAX_FILE_SIZE};
pub use context::{Context, ContextBuilder};
pub use controller::{FileController, ObjectController};
pub use error::{CoreError, CoreResult};
pub use file::{FileState, FileStateBuilder, RemoteFile};
pub use memory::{MemoryFileController, MemoryObjectController, FILE_SAVE_ERROR, OBJECT_NOT_FOUND};
pub use object::{ObjectState, ObjectStateBuilder, RemoteObject};
pub use progress::{ProgressCallback, ProgressReporter};
pub use queue::{Operation, OperationQueue, QueueTail};

pub use tokio_util::sync::CancellationToken;
