//! Remote-backed files.

use crate::config::DEFAULT_FILE_NAME;
use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::queue::{Operation, OperationQueue};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use remora_codec::{FileRef, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Snapshot of a file's remote description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    name: String,
    mime_type: Option<String>,
    url: Option<String>,
}

impl FileState {
    /// Starts building a state.
    pub fn builder() -> FileStateBuilder {
        FileStateBuilder::default()
    }

    /// Builder pre-filled with this state.
    pub fn to_builder(&self) -> FileStateBuilder {
        FileStateBuilder {
            name: Some(self.name.clone()),
            mime_type: self.mime_type.clone(),
            url: self.url.clone(),
        }
    }

    /// File name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content type, if known.
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Remote URL, once saved.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

/// Builder for [`FileState`].
#[derive(Debug, Clone, Default)]
pub struct FileStateBuilder {
    name: Option<String>,
    mime_type: Option<String>,
    url: Option<String>,
}

impl FileStateBuilder {
    /// Sets the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the content type.
    pub fn mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }

    /// Sets the remote URL.
    pub fn url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    /// Builds the state; the name defaults to `"file"`.
    pub fn build(self) -> FileState {
        FileState {
            name: self.name.unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
            mime_type: self.mime_type,
            url: self.url,
        }
    }
}

struct Payload {
    data: Option<Bytes>,
    revision: u64,
    saved_revision: u64,
}

struct FileInner {
    ctx: Context,
    queue: OperationQueue,
    state: RwLock<FileState>,
    payload: Mutex<Payload>,
}

impl FileInner {
    fn is_dirty(&self) -> bool {
        if self.state.read().url.is_none() {
            return true;
        }
        let payload = self.payload.lock();
        payload.revision != payload.saved_revision
    }
}

/// A file stored by the backend.
///
/// Saves and fetches go through the file's own queue, so they run one at a
/// time in call order. Clones are handles to the same file.
#[derive(Clone)]
pub struct RemoteFile {
    inner: Arc<FileInner>,
}

impl RemoteFile {
    /// Creates a new, unsaved file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileTooLarge`] if `data` exceeds the configured
    /// limit.
    pub fn new(
        ctx: &Context,
        name: Option<&str>,
        data: impl Into<Bytes>,
        mime_type: Option<String>,
    ) -> CoreResult<Self> {
        let data = data.into();
        check_size(ctx, &data)?;
        let name = name.map_or_else(|| ctx.config().default_file_name.clone(), str::to_string);
        let state = FileState::builder().name(name).mime_type(mime_type).build();
        Ok(Self::with_payload(
            ctx,
            state,
            Payload {
                data: Some(data),
                revision: 1,
                saved_revision: 0,
            },
        ))
    }

    /// Creates a new, unsaved file with the default name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileTooLarge`] if `data` exceeds the configured
    /// limit.
    pub fn from_data(ctx: &Context, data: impl Into<Bytes>) -> CoreResult<Self> {
        Self::new(ctx, None, data, None)
    }

    /// Wraps an existing remote file description.
    pub fn from_state(ctx: &Context, state: FileState) -> Self {
        Self::with_payload(
            ctx,
            state,
            Payload {
                data: None,
                revision: 0,
                saved_revision: 0,
            },
        )
    }

    fn with_payload(ctx: &Context, state: FileState, payload: Payload) -> Self {
        Self {
            inner: Arc::new(FileInner {
                ctx: ctx.clone(),
                queue: ctx.new_queue(),
                state: RwLock::new(state),
                payload: Mutex::new(payload),
            }),
        }
    }

    /// Replaces the local content; the file becomes dirty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileTooLarge`] if `data` exceeds the configured
    /// limit.
    pub fn set_data(&self, data: impl Into<Bytes>) -> CoreResult<()> {
        let data = data.into();
        check_size(&self.inner.ctx, &data)?;
        let mut payload = self.inner.payload.lock();
        payload.data = Some(data);
        payload.revision += 1;
        Ok(())
    }

    /// Saves the file.
    ///
    /// Resolves without touching the controller when nothing changed since
    /// the last save.
    pub fn save_in_background(
        &self,
        progress: Option<ProgressCallback>,
        cancellation: Option<&CancellationToken>,
    ) -> Operation<()> {
        let inner = Arc::clone(&self.inner);
        let progress = ProgressReporter::new(progress);
        self.inner
            .queue
            .enqueue_linked(cancellation, move |tail, token| async move {
                tail.wait(&token).await?;
                if !inner.is_dirty() {
                    debug!("file is not dirty, skipping save");
                    return Ok(());
                }

                let (data, revision) = {
                    let payload = inner.payload.lock();
                    (payload.data.clone(), payload.revision)
                };
                let state = inner.state.read().clone();
                debug!(name = %state.name(), "saving file");
                let saved = inner
                    .ctx
                    .file_controller()
                    .save(&state, data, progress, token)
                    .await?;

                *inner.state.write() = saved;
                inner.payload.lock().saved_revision = revision;
                Ok(())
            })
    }

    /// Saves the file without progress reporting or a caller token.
    pub fn save(&self) -> Operation<()> {
        self.save_in_background(None, None)
    }

    /// Returns the file's content, fetching it if it is not resident.
    pub fn get_data_in_background(
        &self,
        progress: Option<ProgressCallback>,
        cancellation: Option<&CancellationToken>,
    ) -> Operation<Bytes> {
        let inner = Arc::clone(&self.inner);
        let progress = ProgressReporter::new(progress);
        self.inner
            .queue
            .enqueue_linked(cancellation, move |tail, token| async move {
                tail.wait(&token).await?;
                if let Some(data) = inner.payload.lock().data.clone() {
                    return Ok(data);
                }

                let state = inner.state.read().clone();
                debug!(name = %state.name(), "fetching file data");
                let data = inner
                    .ctx
                    .file_controller()
                    .fetch(&state, progress, token)
                    .await?;

                let mut payload = inner.payload.lock();
                if payload.data.is_none() {
                    payload.data = Some(data.clone());
                }
                Ok(data)
            })
    }

    /// Returns the content without progress reporting or a caller token.
    pub fn get_data(&self) -> Operation<Bytes> {
        self.get_data_in_background(None, None)
    }

    /// Cancels every save and fetch that has not finished yet.
    pub fn cancel(&self) {
        let cancelled = self.inner.queue.cancel_all();
        debug!(cancelled, name = %self.name(), "cancelled file operations");
    }

    /// Returns true if the content can be read without a network fetch.
    pub fn is_data_available(&self) -> bool {
        if self.inner.payload.lock().data.is_some() {
            return true;
        }
        let state = self.inner.state.read().clone();
        self.inner.ctx.file_controller().is_data_available(&state)
    }

    /// Returns true if the file needs saving.
    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    /// File name.
    pub fn name(&self) -> String {
        self.inner.state.read().name.clone()
    }

    /// Remote URL, once saved.
    pub fn url(&self) -> Option<String> {
        self.inner.state.read().url.clone()
    }

    /// Content type, if known.
    pub fn mime_type(&self) -> Option<String> {
        self.inner.state.read().mime_type.clone()
    }

    /// Current state snapshot.
    pub fn state(&self) -> FileState {
        self.inner.state.read().clone()
    }

    /// The file's operation queue.
    pub fn queue(&self) -> &OperationQueue {
        &self.inner.queue
    }

    /// Reference to this file for embedding in object fields.
    pub fn to_value(&self) -> Value {
        let state = self.inner.state.read();
        Value::File(FileRef::new(state.name.clone(), state.url.clone()))
    }
}

impl fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFile")
            .field("state", &*self.inner.state.read())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

fn check_size(ctx: &Context, data: &Bytes) -> CoreResult<()> {
    let limit = ctx.config().max_file_size;
    if data.len() > limit {
        return Err(CoreError::FileTooLarge {
            size: data.len(),
            limit,
        });
    }
    Ok(())
}
