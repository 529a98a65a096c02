use tokio::io::DuplexStream;
use tracing::trace;

/// In-memory transport end.
pub type MemoryStream = DuplexStream;

/// Default per-direction buffer of an in-memory pair: 64 KiB.
pub const DEFAULT_MEMORY_CAPACITY: usize = 64 * 1024;

/// Create two connected in-memory transport ends.
///
/// `capacity` bounds the bytes buffered in each direction; a writer that
/// fills it waits until the other end reads, which makes the pair a faithful
/// stand-in for a socket when exercising backpressure.
pub fn memory_pair(capacity: usize) -> (MemoryStream, MemoryStream) {
    trace!(capacity, "creating in-memory transport pair");
    tokio::io::duplex(capacity)
}
