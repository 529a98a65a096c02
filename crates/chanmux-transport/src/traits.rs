use tokio::io::{AsyncRead, AsyncWrite};

/// An ordered, reliable, bidirectional byte stream a multiplexer can run on.
///
/// Writes complete once the stream has accepted the bytes; a pending write is
/// the transport's backpressure signal. Reads yield chunks of arbitrary size
/// and `Ok(0)` once the remote side has finished.
///
/// Implemented for every `AsyncRead + AsyncWrite` type that can be moved into
/// a background task (`TcpStream`, `UnixStream`, TLS sessions, duplex pipes).
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_transport<T: Transport>() {}

    #[test]
    fn common_streams_are_transports() {
        assert_transport::<tokio::net::TcpStream>();
        assert_transport::<tokio::io::DuplexStream>();
        #[cfg(unix)]
        assert_transport::<tokio::net::UnixStream>();
    }
}
