use std::io;

/// Errors returned by multiplexer and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The multiplexer has been torn down. Transport and framing failures
    /// reach callers this way, carrying the teardown reason.
    #[error("multiplexer closed: {0}")]
    Closed(String),

    /// Channel names used for rendezvous must not be empty.
    #[error("channel name must not be empty")]
    InvalidName,

    /// Another channel is already waiting for an OPEN with this name.
    #[error("a channel named {0:?} is already pending")]
    NameAlreadyPending(String),

    /// The own-channel table is full.
    #[error("too many open channels (max {0})")]
    TooManyChannels(usize),

    /// The write half was already ended.
    #[error("write after end")]
    WriteAfterEnd,

    /// The channel was destroyed.
    #[error("channel destroyed")]
    Destroyed,

    /// Error surfaced on a channel's readable side, so reader results can
    /// be propagated with `?` alongside other multiplexer calls.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, MuxError>;

/// Terminal error delivered to a channel reader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The peer destroyed the channel with a message.
    #[error("channel destroyed by peer: {0}")]
    Remote(String),

    /// The peer destroyed the channel without a message.
    #[error("channel reset by peer")]
    Reset,

    /// The channel was destroyed locally with this message.
    #[error("{0}")]
    Local(String),

    /// The whole multiplexer went down.
    #[error("{0}")]
    Multiplexer(String),
}

impl From<ChannelError> for io::Error {
    fn from(err: ChannelError) -> Self {
        let kind = match err {
            ChannelError::Remote(_) | ChannelError::Reset => io::ErrorKind::ConnectionReset,
            ChannelError::Local(_) => io::ErrorKind::Other,
            ChannelError::Multiplexer(_) => io::ErrorKind::ConnectionAborted,
        };
        io::Error::new(kind, err)
    }
}

impl From<MuxError> for io::Error {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::Channel(e) => e.into(),
            MuxError::Closed(_) => io::Error::new(io::ErrorKind::NotConnected, err),
            MuxError::WriteAfterEnd | MuxError::Destroyed => {
                io::Error::new(io::ErrorKind::BrokenPipe, err)
            }
            other => io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_errors_map_to_io_kinds() {
        let reset: io::Error = ChannelError::Reset.into();
        assert_eq!(reset.kind(), io::ErrorKind::ConnectionReset);

        let aborted: io::Error = ChannelError::Multiplexer("gone".into()).into();
        assert_eq!(aborted.kind(), io::ErrorKind::ConnectionAborted);
        assert_eq!(aborted.to_string(), "gone");
    }

    #[test]
    fn write_after_end_is_broken_pipe() {
        let err: io::Error = MuxError::WriteAfterEnd.into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn channel_errors_propagate_through_question_mark() {
        fn read_side() -> Result<()> {
            let read: std::result::Result<(), ChannelError> = Err(ChannelError::Reset);
            read?;
            Ok(())
        }
        assert!(matches!(read_side(), Err(MuxError::Channel(ChannelError::Reset))));

        let err: io::Error = MuxError::Channel(ChannelError::Reset).into();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        let closed: io::Error = MuxError::Closed("gone".into()).into();
        assert_eq!(closed.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn messages_are_readable() {
        assert_eq!(
            MuxError::NameAlreadyPending("echo".into()).to_string(),
            "a channel named \"echo\" is already pending"
        );
        assert_eq!(
            ChannelError::Remote("boom".into()).to_string(),
            "channel destroyed by peer: boom"
        );
    }
}
