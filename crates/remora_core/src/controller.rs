//! Controller traits: the remote I/O behind the facades.
//!
//! Controllers receive the entity's current state and must return a new
//! state rather than mutate it. Every call takes the unit's cancellation
//! token and must resolve with [`CoreError::Cancelled`](crate::CoreError)
//! promptly once it fires.

use crate::error::CoreResult;
use crate::file::FileState;
use crate::object::ObjectState;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use bytes::Bytes;
use remora_codec::Document;
use tokio_util::sync::CancellationToken;

/// Remote I/O for files.
#[async_trait]
pub trait FileController: Send + Sync {
    /// Returns true if the file's content is available without a fetch.
    fn is_data_available(&self, state: &FileState) -> bool;

    /// Uploads `data` and returns the state of the stored file.
    async fn save(
        &self,
        state: &FileState,
        data: Option<Bytes>,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> CoreResult<FileState>;

    /// Downloads the file's content.
    async fn fetch(
        &self,
        state: &FileState,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> CoreResult<Bytes>;
}

/// Remote I/O for objects.
#[async_trait]
pub trait ObjectController: Send + Sync {
    /// Sends pending field operations and returns the updated state.
    ///
    /// `operations` maps each changed key to its encoded operation.
    async fn save(
        &self,
        state: &ObjectState,
        operations: Document,
        token: CancellationToken,
    ) -> CoreResult<ObjectState>;

    /// Fetches the full server state of a saved object.
    async fn fetch(&self, state: &ObjectState, token: CancellationToken) -> CoreResult<ObjectState>;

    /// Deletes a saved object.
    async fn delete(&self, state: &ObjectState, token: CancellationToken) -> CoreResult<()>;
}
