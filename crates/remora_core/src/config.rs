//! Client configuration.

use serde::Deserialize;

/// Default upper bound for file payloads: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Name given to files created without one.
pub const DEFAULT_FILE_NAME: &str = "file";

/// Configuration shared by every entity created from a [`Context`](crate::Context).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Application identifier sent with every request.
    pub application_id: String,
    /// Client key, if the backend requires one.
    pub client_key: Option<String>,
    /// Base URL of the backend.
    pub server_url: String,
    /// Largest accepted file payload in bytes.
    pub max_file_size: usize,
    /// Name used for files created without one.
    pub default_file_name: String,
}

impl ClientConfig {
    /// Creates a configuration with default limits.
    pub fn new(application_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            client_key: None,
            server_url: server_url.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            default_file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }

    /// Sets the client key.
    pub fn with_client_key(mut self, key: impl Into<String>) -> Self {
        self.client_key = Some(key.into());
        self
    }

    /// Sets the file size limit.
    pub fn with_max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Sets the default file name.
    pub fn with_default_file_name(mut self, name: impl Into<String>) -> Self {
        self.default_file_name = name.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}
