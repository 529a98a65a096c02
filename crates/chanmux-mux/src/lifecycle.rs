//! Per-channel open/end/destroy state machine.
//!
//! Pure bookkeeping: every transition returns the [`Action`]s the driver has
//! to carry out (frames to emit, slot to free). Nothing here touches I/O.

use chanmux_frame::Role;

use crate::config::ChannelOptions;
use crate::error::{MuxError, Result};

/// Side effect requested by a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    /// Send the OPEN frame carrying the channel name.
    EmitOpen,
    /// Send writes queued while the channel was not yet opened.
    FlushQueued,
    /// Send END for the write half.
    EmitEnd,
    /// Send ERROR with this (possibly empty) message.
    EmitError(String),
    /// Release the table slot; the channel is terminal.
    Finalize,
}

/// What to do with a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteStep {
    /// Hold the write until the channel opens.
    Queue,
    /// Send it now, preceded by OPEN if this is a lazy initiator's first frame.
    Send { open_first: bool },
}

#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    role: Role,
    half_open: bool,
    lazy: bool,
    opened: bool,
    open_sent: bool,
    read_ended: bool,
    end_requested: bool,
    write_finished: bool,
    finalized: bool,
    destroyed: bool,
}

impl Lifecycle {
    pub fn new(role: Role, options: ChannelOptions) -> Self {
        Self {
            role,
            half_open: options.half_open,
            lazy: options.lazy,
            opened: false,
            open_sent: false,
            read_ended: false,
            end_requested: false,
            write_finished: false,
            finalized: false,
            destroyed: false,
        }
    }

    /// The channel got its index: locally allocated for an initiator, or
    /// taken from the peer's OPEN for an acceptor.
    pub fn open(&mut self) -> Vec<Action> {
        if self.opened || self.is_terminal() {
            return Vec::new();
        }
        self.opened = true;
        match self.role {
            Role::Initiator if self.lazy => Vec::new(),
            Role::Initiator => {
                self.open_sent = true;
                vec![Action::EmitOpen]
            }
            Role::Acceptor => {
                // Acceptors never send OPEN; the peer already knows the index.
                self.open_sent = true;
                let mut actions = vec![Action::FlushQueued];
                if self.end_requested {
                    actions.extend(self.finish_write());
                }
                actions
            }
        }
    }

    pub fn write(&mut self) -> Result<WriteStep> {
        if self.destroyed {
            return Err(MuxError::Destroyed);
        }
        if self.end_requested {
            return Err(MuxError::WriteAfterEnd);
        }
        if !self.opened {
            return Ok(WriteStep::Queue);
        }
        Ok(WriteStep::Send {
            open_first: self.take_lazy_open(),
        })
    }

    /// Local end of the write half. Ending twice is a no-op.
    pub fn end(&mut self) -> Result<Vec<Action>> {
        if self.destroyed {
            return Err(MuxError::Destroyed);
        }
        if self.end_requested {
            return Ok(Vec::new());
        }
        self.end_requested = true;
        if !self.opened {
            return Ok(Vec::new());
        }
        Ok(self.finish_write())
    }

    /// The peer sent END.
    pub fn remote_end(&mut self) -> Vec<Action> {
        if self.read_ended || self.is_terminal() {
            return Vec::new();
        }
        self.read_ended = true;
        if !self.half_open && !self.end_requested {
            self.end_requested = true;
            if self.opened {
                return self.finish_write();
            }
            return Vec::new();
        }
        if self.write_finished {
            self.finalized = true;
            return vec![Action::Finalize];
        }
        Vec::new()
    }

    /// Abort the channel. `local` destroys notify the peer if it has ever
    /// heard of the channel; remote and teardown destroys stay silent.
    pub fn destroy(&mut self, local: bool, error: Option<&str>) -> Vec<Action> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.destroyed = true;
        self.finalized = true;
        let mut actions = Vec::with_capacity(2);
        if local && self.open_sent {
            actions.push(Action::EmitError(error.unwrap_or_default().to_owned()));
        }
        actions.push(Action::Finalize);
        actions
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_opened(&self) -> bool {
        self.opened
    }

    /// OPEN was emitted (initiator) or received (acceptor).
    pub fn open_sent(&self) -> bool {
        self.open_sent
    }

    pub fn end_requested(&self) -> bool {
        self.end_requested
    }

    pub fn read_ended(&self) -> bool {
        self.read_ended
    }

    pub fn write_finished(&self) -> bool {
        self.write_finished
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn is_terminal(&self) -> bool {
        self.finalized || self.destroyed
    }

    fn take_lazy_open(&mut self) -> bool {
        if self.role == Role::Initiator && !self.open_sent {
            self.open_sent = true;
            return true;
        }
        false
    }

    fn finish_write(&mut self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(3);
        if self.take_lazy_open() {
            actions.push(Action::EmitOpen);
        }
        actions.push(Action::EmitEnd);
        self.write_finished = true;
        if self.read_ended {
            self.finalized = true;
            actions.push(Action::Finalize);
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initiator(options: ChannelOptions) -> Lifecycle {
        Lifecycle::new(Role::Initiator, options)
    }

    fn acceptor(options: ChannelOptions) -> Lifecycle {
        Lifecycle::new(Role::Acceptor, options)
    }

    #[test]
    fn eager_initiator_opens_immediately() {
        let mut lc = initiator(ChannelOptions::default());
        assert_eq!(lc.open(), vec![Action::EmitOpen]);
        assert_eq!(lc.write().unwrap(), WriteStep::Send { open_first: false });
        assert!(lc.open().is_empty(), "open is once only");
    }

    #[test]
    fn lazy_initiator_opens_on_first_write() {
        let mut lc = initiator(ChannelOptions::default().with_lazy(true));
        assert!(lc.open().is_empty());
        assert_eq!(lc.write().unwrap(), WriteStep::Send { open_first: true });
        assert_eq!(lc.write().unwrap(), WriteStep::Send { open_first: false });
    }

    #[test]
    fn lazy_initiator_ended_unwritten_sends_open_then_end() {
        let mut lc = initiator(ChannelOptions::default().with_lazy(true));
        lc.open();
        assert_eq!(lc.end().unwrap(), vec![Action::EmitOpen, Action::EmitEnd]);
        assert!(lc.write_finished());
    }

    #[test]
    fn lazy_initiator_destroyed_unopened_is_silent() {
        let mut lc = initiator(ChannelOptions::default().with_lazy(true));
        lc.open();
        assert_eq!(lc.destroy(true, Some("bye")), vec![Action::Finalize]);
    }

    #[test]
    fn end_twice_is_noop_and_write_after_end_fails() {
        let mut lc = initiator(ChannelOptions::default());
        lc.open();
        assert_eq!(lc.end().unwrap(), vec![Action::EmitEnd]);
        assert!(lc.end().unwrap().is_empty());
        assert!(matches!(lc.write(), Err(MuxError::WriteAfterEnd)));
    }

    #[test]
    fn finalizes_after_both_halves_close() {
        let mut lc = initiator(ChannelOptions::default().with_half_open(true));
        lc.open();
        assert_eq!(lc.end().unwrap(), vec![Action::EmitEnd]);
        assert!(!lc.is_finalized());
        assert_eq!(lc.remote_end(), vec![Action::Finalize]);
        assert!(lc.is_finalized());
        assert!(lc.remote_end().is_empty());
        assert!(lc.destroy(true, None).is_empty(), "nothing after finalize");
    }

    #[test]
    fn remote_end_auto_ends_without_half_open() {
        let mut lc = acceptor(ChannelOptions::default());
        lc.open();
        assert_eq!(lc.remote_end(), vec![Action::EmitEnd, Action::Finalize]);
        assert!(lc.write_finished());
        assert!(lc.is_finalized());
    }

    #[test]
    fn half_open_keeps_write_half() {
        let mut lc = acceptor(ChannelOptions::default().with_half_open(true));
        lc.open();
        assert!(lc.remote_end().is_empty());
        assert!(lc.read_ended());
        assert_eq!(lc.write().unwrap(), WriteStep::Send { open_first: false });
        assert_eq!(lc.end().unwrap(), vec![Action::EmitEnd, Action::Finalize]);
    }

    #[test]
    fn pending_acceptor_queues_until_open() {
        let mut lc = acceptor(ChannelOptions::default());
        assert_eq!(lc.write().unwrap(), WriteStep::Queue);
        assert!(lc.end().unwrap().is_empty());
        assert!(!lc.write_finished());

        assert_eq!(lc.open(), vec![Action::FlushQueued, Action::EmitEnd]);
        assert!(lc.write_finished());
    }

    #[test]
    fn local_destroy_notifies_peer_once() {
        let mut lc = initiator(ChannelOptions::default());
        lc.open();
        assert_eq!(
            lc.destroy(true, Some("boom")),
            vec![Action::EmitError("boom".into()), Action::Finalize]
        );
        assert!(lc.destroy(true, Some("again")).is_empty());
        assert!(lc.is_destroyed());
        assert!(matches!(lc.write(), Err(MuxError::Destroyed)));
        assert!(matches!(lc.end(), Err(MuxError::Destroyed)));
    }

    #[test]
    fn local_destroy_without_message_sends_empty_error() {
        let mut lc = acceptor(ChannelOptions::default());
        lc.open();
        assert_eq!(
            lc.destroy(true, None),
            vec![Action::EmitError(String::new()), Action::Finalize]
        );
    }

    #[test]
    fn remote_destroy_is_silent() {
        let mut lc = acceptor(ChannelOptions::default());
        lc.open();
        assert_eq!(lc.destroy(false, Some("peer")), vec![Action::Finalize]);
    }

    #[test]
    fn unopened_acceptor_destroy_sends_nothing() {
        let mut lc = acceptor(ChannelOptions::default());
        assert_eq!(lc.destroy(true, None), vec![Action::Finalize]);
        assert!(lc.open().is_empty());
    }
}
