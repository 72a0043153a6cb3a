//! Unix domain socket endpoint and listener.
//!
//! The backend listens on a socket file named `.server` inside a directory
//! supplied by configuration. Clients connect to the same path.
//!
//! # Example
//!
//! ```ignore
//! use socket_relay::transport::{Endpoint, RelayListener};
//!
//! let endpoint = Endpoint::in_dir("/tmp/myapp/run")?;
//! let listener = RelayListener::bind(&endpoint, false).await?;
//! let stream = listener.accept().await?;
//! ```

use std::fs;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

use crate::error::{RelayError, Result};

/// File name of the backend socket inside the socket directory.
pub const SOCKET_FILE_NAME: &str = ".server";

/// Socket paths must be shorter than this many bytes (portable `sun_path` size).
pub const MAX_SOCKET_PATH_LEN: usize = 104;

const DIR_MODE: u32 = 0o700;
const SOCKET_MODE: u32 = 0o600;

/// Location of the backend socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    path: PathBuf,
}

impl Endpoint {
    /// Endpoint for the socket file inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_path(dir.as_ref().join(SOCKET_FILE_NAME))
    }

    /// Endpoint for an explicit socket file path.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let len = path.as_os_str().len();
        if len == 0 {
            return Err(RelayError::InvalidEndpoint("empty socket path".to_string()));
        }
        if len >= MAX_SOCKET_PATH_LEN {
            return Err(RelayError::InvalidEndpoint(format!(
                "socket path too long ({} bytes, limit {}): {}",
                len,
                MAX_SOCKET_PATH_LEN - 1,
                path.display()
            )));
        }
        Ok(Self { path })
    }

    /// Socket file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the socket file.
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Create the socket directory if it does not exist.
    ///
    /// New directories are owner-only; an existing directory keeps its mode.
    pub fn ensure_dir(&self) -> Result<()> {
        if let Some(dir) = self.dir() {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(dir)?;
        }
        Ok(())
    }

    /// Connect to the backend.
    ///
    /// Resolves once the connection is established and writable.
    pub async fn connect(&self) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.path).await?;
        stream.writable().await?;
        Ok(stream)
    }
}

/// Listening socket of the backend.
///
/// The socket file is removed when the listener is dropped.
pub struct RelayListener {
    listener: UnixListener,
    path: PathBuf,
}

impl RelayListener {
    /// Bind to the endpoint, creating its directory.
    ///
    /// An existing socket file means another server may be running, so binding
    /// fails with [`RelayError::EndpointInUse`] unless `replace_stale` is set.
    /// The socket file is restricted to the owner.
    pub async fn bind(endpoint: &Endpoint, replace_stale: bool) -> Result<Self> {
        endpoint.ensure_dir()?;

        let path = endpoint.path();
        if path.exists() {
            if !replace_stale {
                return Err(RelayError::EndpointInUse(path.to_path_buf()));
            }
            tracing::warn!(path = %path.display(), "removing stale socket file");
            fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE))?;

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Get the socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RelayListener {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
