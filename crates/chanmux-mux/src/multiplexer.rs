use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use chanmux_transport::Transport;
use futures_core::Stream;
use tokio::sync::{mpsc, oneshot, watch};

use crate::channel::Channel;
use crate::config::{ChannelOptions, MuxConfig};
use crate::driver::{self, Command};
use crate::error::{MuxError, Result};
use crate::shared::SharedChannel;

const DRIVER_STOPPED: &str = "multiplexer driver stopped";

/// Handle to a multiplexer running over one transport.
///
/// Cheap to clone. The multiplexer keeps running while any handle, the
/// [`Incoming`] stream or any channel is alive, or until the transport
/// closes, a framing error occurs or [`destroy`](Self::destroy) is called.
#[derive(Debug, Clone)]
pub struct Multiplexer {
    commands: mpsc::UnboundedSender<Command>,
    closed: watch::Receiver<Option<String>>,
}

impl Multiplexer {
    /// Start multiplexing `transport` with the default configuration.
    ///
    /// Spawns the driver and writer tasks, so it must be called from within
    /// a tokio runtime.
    pub fn new<T: Transport>(transport: T) -> (Self, Incoming) {
        Self::with_config(transport, MuxConfig::default())
    }

    pub fn with_config<T: Transport>(transport: T, config: MuxConfig) -> (Self, Incoming) {
        let handles = driver::spawn(transport, config);
        let mux = Self {
            commands: handles.commands.clone(),
            closed: handles.closed,
        };
        let incoming = Incoming {
            channels: handles.incoming,
            _commands: handles.commands,
        };
        (mux, incoming)
    }

    /// Open a channel in the own table, reusing the lowest free index.
    ///
    /// An empty `name` opens an unnamed channel; the peer then sees the
    /// decimal index as its name.
    pub async fn create_channel(
        &self,
        name: impl Into<Bytes>,
        options: ChannelOptions,
    ) -> Result<Channel> {
        let name = name.into();
        self.request(|reply| Command::Create {
            name,
            options,
            reply,
        })
        .await
    }

    /// Register a channel that is bound to the peer's next OPEN carrying
    /// `name`, at whatever index the peer picks.
    pub async fn accept_by_name(
        &self,
        name: impl Into<Bytes>,
        options: ChannelOptions,
    ) -> Result<Channel> {
        let name = name.into();
        self.request(|reply| Command::Accept {
            name,
            options,
            reply,
        })
        .await
    }

    /// Create the local end of a [`SharedChannel`] named `name`.
    ///
    /// The write half is always lazy and half-open; `options` otherwise
    /// apply to both halves.
    pub async fn create_shared_channel(
        &self,
        name: impl Into<Bytes>,
        options: ChannelOptions,
    ) -> Result<SharedChannel> {
        let name = name.into();
        if name.is_empty() {
            return Err(MuxError::InvalidName);
        }
        let read_side = self.accept_by_name(name.clone(), options).await?;
        let write_side = self
            .create_channel(name.clone(), options.with_lazy(true).with_half_open(true))
            .await?;
        SharedChannel::new(name, read_side, write_side)
    }

    /// Hold back transport flushes until the matching [`uncork`](Self::uncork).
    pub fn cork(&self) {
        let _ = self.commands.send(Command::Cork);
    }

    pub fn uncork(&self) {
        let _ = self.commands.send(Command::Uncork);
    }

    /// Tear the multiplexer down. Every live channel receives
    /// `ChannelError::Multiplexer(reason)`; nothing is sent to the peer.
    pub fn destroy(&self, reason: impl Into<String>) {
        let _ = self.commands.send(Command::Shutdown {
            reason: reason.into(),
        });
    }

    /// Resolves with the teardown reason once the multiplexer is down.
    pub async fn closed(&self) -> String {
        let mut closed = self.closed.clone();
        if let Ok(reason) = closed.wait_for(Option::is_some).await {
            return reason.clone().unwrap_or_default();
        }
        DRIVER_STOPPED.to_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.borrow().is_some()
    }

    /// The teardown reason, if the multiplexer is down.
    pub fn close_reason(&self) -> Option<String> {
        self.closed.borrow().clone()
    }

    async fn request<F>(&self, command: F) -> Result<Channel>
    where
        F: FnOnce(oneshot::Sender<Result<Channel>>) -> Command,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| self.closed_error())?;
        response.await.unwrap_or_else(|_| Err(self.closed_error()))
    }

    fn closed_error(&self) -> MuxError {
        MuxError::Closed(
            self.close_reason()
                .unwrap_or_else(|| DRIVER_STOPPED.to_owned()),
        )
    }
}

/// Channels opened by the peer, in OPEN order.
///
/// Ends once the multiplexer is torn down. Dropping it makes the
/// multiplexer refuse further peer channels by destroying them.
#[derive(Debug)]
pub struct Incoming {
    channels: mpsc::UnboundedReceiver<Channel>,
    _commands: mpsc::UnboundedSender<Command>,
}

impl Incoming {
    pub async fn accept(&mut self) -> Option<Channel> {
        self.channels.recv().await
    }
}

impl Stream for Incoming {
    type Item = Channel;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Channel>> {
        self.channels.poll_recv(cx)
    }
}
