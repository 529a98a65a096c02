use std::path::PathBuf;

/// Failures while setting up or driving a byte transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// Read or write failure on an established stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `sockaddr_un` cannot hold the path.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::io;

    use super::*;

    #[test]
    fn connect_error_names_the_path() {
        let err = TransportError::Connect {
            path: "/tmp/missing.sock".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("failed to connect to /tmp/missing.sock"));
        assert!(err.source().is_some());
    }

    #[test]
    fn io_errors_convert() {
        let err: TransportError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, TransportError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
