//! The driver task: owns both channel tables, the demuxer and every
//! channel's lifecycle. Handles talk to it through [`Command`]s.

use std::collections::{HashMap, VecDeque};

use bytes::{Bytes, BytesMut};
use chanmux_frame::{Demuxer, Event, Frame, FrameWriter, Role, Table};
use chanmux_transport::Transport;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use crate::channel::{Channel, ChannelId, ChannelReader, ChannelStatus, ChannelWriter, Inbound};
use crate::config::{ChannelOptions, MuxConfig};
use crate::error::{ChannelError, MuxError, Result};
use crate::lifecycle::{Action, Lifecycle, WriteStep};
use crate::outbound::{run_writer, Ack, Outbound, WriteAck, WriterEvent};

/// Teardown reason when the peer closes the transport.
pub(crate) const STREAM_CLOSED: &str = "underlying stream has been closed";

const HANDLES_DROPPED: &str = "multiplexer handles dropped";
const WRITER_STOPPED: &str = "writer task stopped";

/// Locally destroyed indices held back from reuse, oldest released first.
pub(crate) const COOLING_INDICES: usize = 16;

pub(crate) enum Command {
    Create {
        name: Bytes,
        options: ChannelOptions,
        reply: oneshot::Sender<Result<Channel>>,
    },
    Accept {
        name: Bytes,
        options: ChannelOptions,
        reply: oneshot::Sender<Result<Channel>>,
    },
    Write {
        id: ChannelId,
        data: Bytes,
        ack: Ack,
    },
    End {
        id: ChannelId,
        ack: Option<Ack>,
    },
    Destroy {
        id: ChannelId,
        error: Option<String>,
    },
    /// The last writer handle of a channel went away.
    Dropped {
        id: ChannelId,
    },
    Cork,
    Uncork,
    Shutdown {
        reason: String,
    },
}

/// The handle-side ends of a spawned multiplexer.
pub(crate) struct Handles {
    pub commands: mpsc::UnboundedSender<Command>,
    pub incoming: mpsc::UnboundedReceiver<Channel>,
    pub closed: watch::Receiver<Option<String>>,
}

/// Split `transport` and spawn the driver and writer tasks.
pub(crate) fn spawn<T: Transport>(transport: T, config: MuxConfig) -> Handles {
    let (reader, writer) = tokio::io::split(transport);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (closed_tx, closed_rx) = watch::channel(None);

    tokio::spawn(run_writer(FrameWriter::new(writer), outbound_rx, events_tx));

    let driver = Driver {
        reader,
        read_buf: BytesMut::with_capacity(config.effective_read_chunk_size()),
        demuxer: Demuxer::with_config(config.frame_config()),
        commands_rx,
        commands: commands_tx.downgrade(),
        outbound: outbound_tx,
        events: events_rx,
        incoming: Some(incoming_tx),
        closed: closed_tx,
        slots: HashMap::new(),
        own: Vec::new(),
        cooling: VecDeque::new(),
        peer: HashMap::new(),
        pending_accepts: HashMap::new(),
        next_id: 0,
        stalled: FuturesUnordered::new(),
        awaiting_drains: 0,
        config,
    };
    tokio::spawn(driver.run());

    Handles {
        commands: commands_tx,
        incoming: incoming_rx,
        closed: closed_rx,
    }
}

struct Slot {
    index: Option<u64>,
    /// Local name; the decimal index for unnamed channels.
    name: Bytes,
    /// Payload of our OPEN frame.
    wire_name: Bytes,
    options: ChannelOptions,
    lifecycle: Lifecycle,
    inbound: mpsc::Sender<Inbound>,
    status: watch::Sender<ChannelStatus>,
    open_acked: bool,
    queued: VecDeque<(Bytes, Ack)>,
    end_ack: Option<Ack>,
    /// Deliveries parked on a full reader.
    stalled: usize,
    /// Cancels the parked delivery when the channel is destroyed.
    release: Option<oneshot::Sender<()>>,
    /// We sent ERROR while the peer may still be writing to this index.
    destroyed_locally: bool,
}

impl Slot {
    fn snapshot(&self) -> ChannelStatus {
        ChannelStatus {
            index: self.index,
            opened: self.lifecycle.is_opened(),
            open_acked: self.open_acked,
            read_ended: self.lifecycle.read_ended(),
            write_finished: self.lifecycle.write_finished(),
            finalized: self.lifecycle.is_finalized(),
            destroyed: self.lifecycle.is_destroyed(),
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.snapshot());
    }

    fn fail_pending(&mut self, err: impl Fn() -> MuxError) {
        for (_, ack) in self.queued.drain(..) {
            let _ = ack.send(Err(err()));
        }
        if let Some(ack) = self.end_ack.take() {
            let _ = ack.send(Err(err()));
        }
    }
}

struct Driver<R> {
    reader: R,
    read_buf: BytesMut,
    demuxer: Demuxer,
    config: MuxConfig,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    // Weak so that the driver stops once every handle is gone.
    commands: mpsc::WeakUnboundedSender<Command>,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<WriterEvent>,
    incoming: Option<mpsc::UnboundedSender<Channel>>,
    closed: watch::Sender<Option<String>>,
    slots: HashMap<ChannelId, Slot>,
    own: Vec<Option<ChannelId>>,
    // Free own indices that stale peer frames may still target.
    cooling: VecDeque<u64>,
    peer: HashMap<u64, ChannelId>,
    pending_accepts: HashMap<Bytes, ChannelId>,
    next_id: u64,
    stalled: FuturesUnordered<BoxFuture<'static, ChannelId>>,
    awaiting_drains: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> Driver<R> {
    async fn run(mut self) {
        let reason = self.serve().await;
        self.teardown(&reason);
        while let Some(command) = self.commands_rx.recv().await {
            reject(command, &reason);
        }
        trace!("multiplexer driver stopped");
    }

    /// Runs until the multiplexer has to go down; returns the reason.
    async fn serve(&mut self) -> String {
        loop {
            self.read_buf
                .reserve(self.config.effective_read_chunk_size());

            tokio::select! {
                command = self.commands_rx.recv() => {
                    let Some(command) = command else {
                        return HANDLES_DROPPED.to_owned();
                    };
                    if let Err(reason) = self.handle_command(command) {
                        return reason;
                    }
                }
                Some(event) = self.events.recv() => match event {
                    WriterEvent::Opened(id) => self.open_acked(id),
                    WriterEvent::Failed(reason) => return reason,
                },
                Some(id) = self.stalled.next(), if !self.stalled.is_empty() => {
                    if let Err(reason) = self.drained(id) {
                        return reason;
                    }
                }
                read = self.reader.read_buf(&mut self.read_buf), if self.awaiting_drains == 0 => {
                    match read {
                        Ok(0) => return STREAM_CLOSED.to_owned(),
                        Ok(size) => {
                            trace!(size, "transport chunk");
                            if let Err(reason) = self.process_input() {
                                return reason;
                            }
                        }
                        Err(err) => return format!("transport read failed: {err}"),
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> std::result::Result<(), String> {
        match command {
            Command::Create {
                name,
                options,
                reply,
            } => {
                let _ = reply.send(self.create(name, options));
            }
            Command::Accept {
                name,
                options,
                reply,
            } => {
                let _ = reply.send(self.accept(name, options));
            }
            Command::Write { id, data, ack } => self.write(id, data, ack),
            Command::End { id, ack } => self.end(id, ack),
            Command::Destroy { id, error } => self.destroy_local(id, error),
            Command::Dropped { id } => self.dropped(id),
            Command::Cork => {
                let _ = self.outbound.send(Outbound::Cork);
            }
            Command::Uncork => {
                let _ = self.outbound.send(Outbound::Uncork);
            }
            Command::Shutdown { reason } => return Err(reason),
        }
        Ok(())
    }

    fn create(&mut self, name: Bytes, options: ChannelOptions) -> Result<Channel> {
        let index = self.free_own_index()?;
        let id = self.next_id();
        let local_name = if name.is_empty() {
            Bytes::from(index.to_string())
        } else {
            name.clone()
        };
        let (slot, channel) =
            self.new_slot(id, Role::Initiator, Some(index), local_name, name, options)?;

        debug!(
            index,
            name = %String::from_utf8_lossy(&slot.name),
            lazy = options.lazy,
            "channel created"
        );
        self.occupy_own(index, id);
        self.slots.insert(id, slot);
        let actions = self.lifecycle_mut(id, Lifecycle::open);
        self.apply(id, actions);
        Ok(channel)
    }

    fn accept(&mut self, name: Bytes, options: ChannelOptions) -> Result<Channel> {
        if name.is_empty() {
            return Err(MuxError::InvalidName);
        }
        if self.pending_accepts.contains_key(&name) {
            return Err(MuxError::NameAlreadyPending(
                String::from_utf8_lossy(&name).into_owned(),
            ));
        }
        let id = self.next_id();
        let (slot, channel) =
            self.new_slot(id, Role::Acceptor, None, name.clone(), name.clone(), options)?;

        debug!(name = %String::from_utf8_lossy(&name), "waiting for channel by name");
        self.slots.insert(id, slot);
        self.pending_accepts.insert(name, id);
        Ok(channel)
    }

    fn write(&mut self, id: ChannelId, data: Bytes, ack: Ack) {
        let Some(slot) = self.slots.get_mut(&id) else {
            let _ = ack.send(Err(MuxError::Destroyed));
            return;
        };
        match slot.lifecycle.write() {
            Err(err) => {
                let _ = ack.send(Err(err));
            }
            Ok(WriteStep::Queue) => {
                trace!(size = data.len(), "write queued until the channel opens");
                slot.queued.push_back((data, ack));
            }
            Ok(WriteStep::Send { open_first }) => {
                let Some(index) = slot.index else {
                    let _ = ack.send(Err(MuxError::Destroyed));
                    return;
                };
                let role = slot.lifecycle.role();
                if open_first {
                    emit(
                        &self.outbound,
                        Frame::open(index, slot.wire_name.clone()),
                        WriteAck::Opened(id),
                    );
                }
                emit(
                    &self.outbound,
                    Frame::data(index, role, data),
                    WriteAck::Caller(ack),
                );
            }
        }
    }

    fn end(&mut self, id: ChannelId, ack: Option<Ack>) {
        let Some(slot) = self.slots.get_mut(&id) else {
            reply(ack, Err(MuxError::Destroyed));
            return;
        };
        if slot.lifecycle.end_requested() {
            reply(ack, Ok(()));
            return;
        }
        match slot.lifecycle.end() {
            Err(err) => reply(ack, Err(err)),
            Ok(actions) => {
                slot.end_ack = ack;
                self.apply(id, actions);
            }
        }
    }

    fn destroy_local(&mut self, id: ChannelId, error: Option<String>) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        let actions = slot.lifecycle.destroy(true, error.as_deref());
        if actions.is_empty() {
            return;
        }
        debug!(index = ?slot.index, error = ?error, "channel destroyed locally");
        slot.destroyed_locally = slot.lifecycle.open_sent();
        if let Some(message) = error {
            if !slot.inbound.is_closed() {
                deliver_now(&slot.inbound, Inbound::Error(ChannelError::Local(message)));
            }
        }
        self.apply(id, actions);
    }

    fn destroy_remote(&mut self, id: ChannelId, err: ChannelError) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        let actions = slot.lifecycle.destroy(false, None);
        if actions.is_empty() {
            return;
        }
        debug!(index = ?slot.index, error = %err, "channel destroyed by peer");
        if !slot.inbound.is_closed() {
            deliver_now(&slot.inbound, Inbound::Error(err));
        }
        self.apply(id, actions);
    }

    fn dropped(&mut self, id: ChannelId) {
        let abandoned = self.slots.get(&id).is_some_and(|slot| {
            !slot.lifecycle.end_requested() && !slot.lifecycle.is_destroyed()
        });
        if abandoned {
            trace!(?id, "last writer dropped before end");
            self.destroy_local(id, None);
        }
    }

    fn open_acked(&mut self, id: ChannelId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.open_acked = true;
            slot.publish();
        }
    }

    /// Decode and dispatch buffered input until it runs out or a reader
    /// stalls.
    fn process_input(&mut self) -> std::result::Result<(), String> {
        while self.awaiting_drains == 0 {
            let (own, peer, slots) = (&self.own, &self.peer, &self.slots);
            let decoded = self.demuxer.decode(&mut self.read_buf, |table, index| {
                resolve(own, peer, table, index)
                    .and_then(|id| slots.get(&id))
                    .is_some_and(|slot| slot.options.chunked)
            });
            match decoded {
                Ok(Some(event)) => self.dispatch(event),
                Ok(None) => return Ok(()),
                Err(err) => {
                    warn!(error = %err, "framing error");
                    return Err(err.to_string());
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Open { index, name } => self.remote_open(index, name),
            Event::Data {
                table,
                index,
                payload,
                ..
            } => {
                let Some(id) = self.live(table, index) else {
                    trace!(index, ?table, "data for unknown channel dropped");
                    return;
                };
                trace!(index, size = payload.len(), "data");
                self.deliver(id, Inbound::Data(payload));
            }
            Event::End { table, index } => {
                let Some(id) = self.live(table, index) else {
                    trace!(index, ?table, "end for unknown channel dropped");
                    return;
                };
                debug!(index, ?table, "remote end");
                let actions = self.lifecycle_mut(id, Lifecycle::remote_end);
                self.deliver(id, Inbound::End);
                self.apply(id, actions);
            }
            Event::Error {
                table,
                index,
                message,
            } => {
                let Some(id) = resolve(&self.own, &self.peer, table, index) else {
                    trace!(index, ?table, "error for unknown channel dropped");
                    return;
                };
                let err = if message.is_empty() {
                    ChannelError::Reset
                } else {
                    ChannelError::Remote(String::from_utf8_lossy(&message).into_owned())
                };
                self.destroy_remote(id, err);
            }
        }
    }

    fn remote_open(&mut self, index: u64, name: Bytes) {
        let name = if name.is_empty() {
            Bytes::from(index.to_string())
        } else {
            name
        };

        if let Some(old) = self.peer.get(&index).copied() {
            warn!(index, "peer reopened a live channel index, dropping the old channel");
            self.destroy_remote(old, ChannelError::Reset);
        }

        if let Some(id) = self.pending_accepts.remove(&name) {
            if let Some(slot) = self.slots.get_mut(&id) {
                debug!(index, name = %String::from_utf8_lossy(&name), "pending channel claimed");
                slot.index = Some(index);
                slot.open_acked = true;
                self.peer.insert(index, id);
                let actions = slot.lifecycle.open();
                self.apply(id, actions);
                return;
            }
        }

        let id = self.next_id();
        let options = self.config.incoming;
        let (mut slot, channel) = match self.new_slot(
            id,
            Role::Acceptor,
            Some(index),
            name.clone(),
            name.clone(),
            options,
        ) {
            Ok(parts) => parts,
            Err(err) => {
                debug!(index, error = %err, "cannot surface incoming channel");
                return;
            }
        };
        slot.open_acked = true;
        let actions = slot.lifecycle.open();
        self.slots.insert(id, slot);
        self.peer.insert(index, id);
        self.apply(id, actions);
        debug!(index, name = %String::from_utf8_lossy(&name), "incoming channel");

        let undelivered = match &self.incoming {
            Some(incoming) => incoming.send(channel).err().map(|SendError(channel)| channel),
            None => Some(channel),
        };
        if undelivered.is_some() {
            // Dropping it destroys the channel and tells the peer.
            trace!(index, "nobody accepts incoming channels");
        }
    }

    /// Resolve to a channel that still accepts reads.
    fn live(&self, table: Table, index: u64) -> Option<ChannelId> {
        let id = resolve(&self.own, &self.peer, table, index)?;
        let slot = self.slots.get(&id)?;
        if slot.lifecycle.read_ended() || slot.lifecycle.is_destroyed() {
            return None;
        }
        Some(id)
    }

    /// Hand `item` to the channel reader, parking it and pausing transport
    /// reads if the reader is full.
    fn deliver(&mut self, id: ChannelId, item: Inbound) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        match slot.inbound.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                trace!(index = ?slot.index, "reader detached, payload discarded");
            }
            Err(TrySendError::Full(item)) => {
                slot.stalled += 1;
                self.awaiting_drains += 1;
                trace!(
                    index = ?slot.index,
                    awaiting = self.awaiting_drains,
                    "channel reader full, pausing transport reads"
                );
                let (release, released) = oneshot::channel();
                slot.release = Some(release);
                let inbound = slot.inbound.clone();
                self.stalled.push(Box::pin(async move {
                    tokio::select! {
                        permit = inbound.reserve_owned() => {
                            if let Ok(permit) = permit {
                                permit.send(item);
                            }
                        }
                        Ok(()) = released => {}
                    }
                    id
                }));
            }
        }
    }

    fn drained(&mut self, id: ChannelId) -> std::result::Result<(), String> {
        self.awaiting_drains = self.awaiting_drains.saturating_sub(1);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.stalled = slot.stalled.saturating_sub(1);
            slot.release = None;
        }
        if self.awaiting_drains > 0 {
            return Ok(());
        }
        trace!("channel drained, resuming transport reads");
        self.process_input()
    }

    fn apply(&mut self, id: ChannelId, actions: Vec<Action>) {
        for action in actions {
            let Some(slot) = self.slots.get_mut(&id) else {
                return;
            };
            if action == Action::Finalize {
                self.finalize(id);
                return;
            }
            let Some(index) = slot.index else {
                continue;
            };
            let role = slot.lifecycle.role();
            match action {
                Action::EmitOpen => emit(
                    &self.outbound,
                    Frame::open(index, slot.wire_name.clone()),
                    WriteAck::Opened(id),
                ),
                Action::FlushQueued => {
                    for (data, ack) in slot.queued.drain(..) {
                        emit(
                            &self.outbound,
                            Frame::data(index, role, data),
                            WriteAck::Caller(ack),
                        );
                    }
                }
                Action::EmitEnd => {
                    let ack = slot.end_ack.take().map_or(WriteAck::None, WriteAck::Caller);
                    emit(&self.outbound, Frame::end(index, role), ack);
                }
                Action::EmitError(message) => emit(
                    &self.outbound,
                    Frame::error(index, role, message),
                    WriteAck::None,
                ),
                Action::Finalize => {}
            }
        }
        if let Some(slot) = self.slots.get(&id) {
            slot.publish();
        }
    }

    /// Drop the slot and free its table entries for reuse.
    fn finalize(&mut self, id: ChannelId) {
        let Some(mut slot) = self.slots.remove(&id) else {
            return;
        };
        match (slot.lifecycle.role(), slot.index) {
            (Role::Initiator, Some(index)) => {
                let freed = match usize::try_from(index).ok().and_then(|i| self.own.get_mut(i)) {
                    Some(entry) if *entry == Some(id) => {
                        *entry = None;
                        true
                    }
                    _ => false,
                };
                if freed && slot.destroyed_locally {
                    self.cool(index);
                }
                self.trim_own();
            }
            (Role::Acceptor, Some(index)) => {
                if self.peer.get(&index) == Some(&id) {
                    self.peer.remove(&index);
                }
            }
            (_, None) => {}
        }
        if self.pending_accepts.get(&slot.name) == Some(&id) {
            self.pending_accepts.remove(&slot.name);
        }

        let destroyed = slot.lifecycle.is_destroyed();
        if destroyed {
            if let Some(release) = slot.release.take() {
                let _ = release.send(());
            }
        } else if slot.lifecycle.open_sent() {
            // The peer ended an index it could only know from our OPEN, even
            // if the writer has not reported the OPEN yet.
            slot.open_acked = true;
        }
        slot.fail_pending(|| MuxError::Destroyed);
        slot.publish();
        debug!(index = ?slot.index, destroyed, "channel finalized");
    }

    fn teardown(&mut self, reason: &str) {
        if reason == STREAM_CLOSED || reason == HANDLES_DROPPED {
            debug!(reason, "multiplexer closed");
        } else {
            warn!(reason, "multiplexer torn down");
        }

        let ids: Vec<ChannelId> = self.slots.keys().copied().collect();
        for id in ids {
            let Some(slot) = self.slots.get_mut(&id) else {
                continue;
            };
            let surface = !slot.lifecycle.read_ended() && !slot.inbound.is_closed();
            slot.lifecycle.destroy(false, None);
            if surface {
                deliver_now(
                    &slot.inbound,
                    Inbound::Error(ChannelError::Multiplexer(reason.to_owned())),
                );
            }
            slot.fail_pending(|| MuxError::Closed(reason.to_owned()));
            self.finalize(id);
        }

        self.own.clear();
        self.cooling.clear();
        self.peer.clear();
        self.pending_accepts.clear();
        self.stalled = FuturesUnordered::new();
        self.awaiting_drains = 0;
        self.read_buf.clear();
        self.incoming = None;
        self.closed.send_replace(Some(reason.to_owned()));
        let _ = self.outbound.send(Outbound::Shutdown);
    }

    fn new_slot(
        &self,
        id: ChannelId,
        role: Role,
        index: Option<u64>,
        name: Bytes,
        wire_name: Bytes,
        options: ChannelOptions,
    ) -> Result<(Slot, Channel)> {
        let commands = self
            .commands
            .upgrade()
            .ok_or_else(|| MuxError::Closed(HANDLES_DROPPED.to_owned()))?;
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.effective_channel_buffer());
        let (status_tx, status_rx) = watch::channel(ChannelStatus {
            index,
            ..ChannelStatus::default()
        });
        let writer = ChannelWriter::new(id, name.clone(), role, commands, status_rx);

        let slot = Slot {
            index,
            name,
            wire_name,
            options,
            lifecycle: Lifecycle::new(role, options),
            inbound: inbound_tx,
            status: status_tx,
            open_acked: false,
            queued: VecDeque::new(),
            end_ack: None,
            stalled: 0,
            release: None,
            destroyed_locally: false,
        };
        Ok((slot, Channel::new(ChannelReader::new(inbound_rx), writer)))
    }

    fn lifecycle_mut(
        &mut self,
        id: ChannelId,
        step: fn(&mut Lifecycle) -> Vec<Action>,
    ) -> Vec<Action> {
        self.slots
            .get_mut(&id)
            .map(|slot| step(&mut slot.lifecycle))
            .unwrap_or_default()
    }

    fn free_own_index(&self) -> Result<u64> {
        if let Some(max) = self.config.max_channels {
            let live = self.own.iter().filter(|entry| entry.is_some()).count();
            if live >= max {
                return Err(MuxError::TooManyChannels(max));
            }
        }
        let index = self
            .own
            .iter()
            .enumerate()
            .position(|(i, entry)| entry.is_none() && !self.cooling.contains(&(i as u64)))
            .unwrap_or(self.own.len());
        Ok(index as u64)
    }

    fn cool(&mut self, index: u64) {
        self.cooling.push_back(index);
        if self.cooling.len() > COOLING_INDICES {
            self.cooling.pop_front();
        }
    }

    // Cooling indices stay in the table so that extending it skips them.
    fn trim_own(&mut self) {
        while matches!(self.own.last(), Some(None))
            && !self.cooling.contains(&(self.own.len() as u64 - 1))
        {
            self.own.pop();
        }
    }

    fn occupy_own(&mut self, index: u64, id: ChannelId) {
        let index = index as usize;
        if index == self.own.len() {
            self.own.push(Some(id));
        } else {
            self.own[index] = Some(id);
        }
    }

    fn next_id(&mut self) -> ChannelId {
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        id
    }
}

fn resolve(
    own: &[Option<ChannelId>],
    peer: &HashMap<u64, ChannelId>,
    table: Table,
    index: u64,
) -> Option<ChannelId> {
    match table {
        Table::Own => usize::try_from(index)
            .ok()
            .and_then(|i| own.get(i).copied().flatten()),
        Table::Peer => peer.get(&index).copied(),
    }
}

fn emit(outbound: &mpsc::UnboundedSender<Outbound>, frame: Frame, ack: WriteAck) {
    trace!(
        index = frame.index,
        opcode = frame.opcode.as_u8(),
        size = frame.payload.len(),
        "frame queued"
    );
    if let Err(SendError(Outbound::Frame { ack, .. })) = outbound.send(Outbound::Frame { frame, ack })
    {
        ack.fail(WRITER_STOPPED);
    }
}

fn reject(command: Command, reason: &str) {
    let closed = || MuxError::Closed(reason.to_owned());
    match command {
        Command::Create { reply, .. } | Command::Accept { reply, .. } => {
            let _ = reply.send(Err(closed()));
        }
        Command::Write { ack, .. } => {
            let _ = ack.send(Err(closed()));
        }
        Command::End { ack, .. } => reply(ack, Err(closed())),
        Command::Destroy { .. }
        | Command::Dropped { .. }
        | Command::Cork
        | Command::Uncork
        | Command::Shutdown { .. } => {}
    }
}

fn reply(ack: Option<Ack>, result: Result<()>) {
    if let Some(ack) = ack {
        let _ = ack.send(result);
    }
}

/// Deliver without stalling the driver; used for terminal errors.
fn deliver_now(inbound: &mpsc::Sender<Inbound>, item: Inbound) {
    if let Err(TrySendError::Full(item)) = inbound.try_send(item) {
        let inbound = inbound.clone();
        tokio::spawn(async move {
            let _ = inbound.send(item).await;
        });
    }
}
