use chanmux_frame::{FrameConfig, DEFAULT_MAX_MESSAGE_SIZE};
use serde::{Deserialize, Serialize};

/// Default number of undelivered messages buffered per channel reader.
pub const DEFAULT_CHANNEL_BUFFER: usize = 16;

/// Default transport read size: 8 KiB.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// Per-channel behaviour switches. All default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelOptions {
    /// Deliver large DATA payloads in pieces as they arrive instead of
    /// buffering each message whole.
    pub chunked: bool,
    /// Keep the write half open after the peer ends its side.
    pub half_open: bool,
    /// Defer the OPEN frame of an initiator until its first write or end.
    pub lazy: bool,
}

impl ChannelOptions {
    pub fn with_chunked(mut self, chunked: bool) -> Self {
        self.chunked = chunked;
        self
    }

    pub fn with_half_open(mut self, half_open: bool) -> Self {
        self.half_open = half_open;
        self
    }

    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }
}

/// Multiplexer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Largest incoming payload accepted before the multiplexer is torn
    /// down with "incoming message too large".
    pub max_message_size: u64,
    /// Messages buffered per channel reader before backpressure kicks in.
    pub channel_buffer: usize,
    /// Bytes requested from the transport per read.
    pub read_chunk_size: usize,
    /// Cap on simultaneously open locally created channels.
    pub max_channels: Option<usize>,
    /// Options for peer-opened channels that no `accept_by_name` claimed.
    /// `lazy` has no effect on them.
    pub incoming: ChannelOptions,
}

impl MuxConfig {
    pub fn with_max_message_size(mut self, max: u64) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn with_channel_buffer(mut self, size: usize) -> Self {
        self.channel_buffer = size;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    pub fn with_max_channels(mut self, max: usize) -> Self {
        self.max_channels = Some(max);
        self
    }

    pub fn with_incoming(mut self, options: ChannelOptions) -> Self {
        self.incoming = options;
        self
    }

    /// Frame-layer view of this configuration.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig::default().with_max_message_size(self.max_message_size)
    }

    // tokio's bounded queues reject a capacity of zero.
    pub(crate) fn effective_channel_buffer(&self) -> usize {
        self.channel_buffer.max(1)
    }

    pub(crate) fn effective_read_chunk_size(&self) -> usize {
        self.read_chunk_size.max(1)
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_channels: None,
            incoming: ChannelOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MuxConfig::default();
        assert_eq!(config.max_message_size, u64::MAX);
        assert_eq!(config.channel_buffer, 16);
        assert_eq!(config.read_chunk_size, 8192);
        assert_eq!(config.max_channels, None);
        assert_eq!(config.incoming, ChannelOptions::default());
        assert_eq!(ChannelOptions::default(), ChannelOptions {
            chunked: false,
            half_open: false,
            lazy: false,
        });
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: MuxConfig =
            serde_json::from_str(r#"{"max_message_size": 1024, "max_channels": 4, "incoming": {"chunked": true}}"#).unwrap();
        assert_eq!(config.max_message_size, 1024);
        assert_eq!(config.max_channels, Some(4));
        assert!(config.incoming.chunked && !config.incoming.half_open);
        assert_eq!(config.channel_buffer, DEFAULT_CHANNEL_BUFFER);

        let options: ChannelOptions = serde_json::from_str(r#"{"half_open": true}"#).unwrap();
        assert!(options.half_open);
        assert!(!options.lazy);
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let config = MuxConfig::default()
            .with_channel_buffer(0)
            .with_read_chunk_size(0);
        assert_eq!(config.effective_channel_buffer(), 1);
        assert_eq!(config.effective_read_chunk_size(), 1);
    }

    #[test]
    fn frame_config_carries_limit() {
        let config = MuxConfig::default().with_max_message_size(64);
        assert_eq!(config.frame_config().max_message_size, 64);
    }
}
