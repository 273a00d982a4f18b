use super::types::Response;
use futures::{SinkExt, StreamExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

/// Longest request line the server accepts.
const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Framing error: {0}")]
    Codec(#[from] LinesCodecError),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Newline-delimited JSON over a Unix stream.
pub type Connection = Framed<UnixStream, LinesCodec>;

/// Unix socket transport for IPC communication.
#[derive(Debug, Clone)]
pub struct UnixSocketTransport {
    socket_path: PathBuf,
}

impl UnixSocketTransport {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Binds to the Unix socket and returns a listener.
    ///
    /// A stale socket file left by a previous run is removed first.
    pub async fn bind(&self) -> Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, perms)?;
        }

        Ok(listener)
    }

    /// Cleans up the socket file.
    pub fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

pub fn connection(stream: UnixStream) -> Connection {
    Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH))
}

/// Reads the next request line, or `None` once the client has hung up.
pub async fn read_line(conn: &mut Connection) -> Result<Option<String>> {
    match conn.next().await {
        Some(line) => Ok(Some(line?)),
        None => Ok(None),
    }
}

/// Resolves when the client closes its side of the connection.
///
/// Lines sent while a request is in flight are discarded.
pub async fn closed(conn: &mut Connection) {
    while let Some(Ok(_)) = conn.next().await {}
}

/// Writes one response line to the client.
pub async fn write_response(conn: &mut Connection, response: &Response) -> Result<()> {
    let json = serde_json::to_string(response)?;
    conn.send(json).await?;
    Ok(())
}
