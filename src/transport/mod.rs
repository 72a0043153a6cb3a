//! Transport module - Unix domain socket endpoint handling.
//!
//! Provides:
//! - [`Endpoint`]: the backend socket file inside a configured directory
//! - [`RelayListener`]: the backend's listening socket, removed on drop

mod socket;

pub use socket::{Endpoint, RelayListener, MAX_SOCKET_PATH_LEN, SOCKET_FILE_NAME};
