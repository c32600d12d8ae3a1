//! The seam through which the engine reaches other processes.
//!
//! The engine never touches bytes: it hands a [`Message`] and a destination
//! to a [`Transport`]. [`MailboxTransport`] is the in-process implementation,
//! one unbounded tokio channel per IPC queue, tracked in a `DashMap`.

use dashmap::DashMap;
use discovery_core::{IpcId, Message, ProcessHandle};
use tokio::sync::mpsc;

/// Error returned when a message cannot be handed to its destination.
///
/// Never fatal: the sender logs it and treats the destination as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// No queue with this identity is known.
    #[error("no queue registered for ipc {ipc}")]
    Unreachable { ipc: IpcId },
    /// The queue existed but its receiver has gone away.
    #[error("queue {ipc} is closed")]
    Disconnected { ipc: IpcId },
}

/// Delivers messages to local processes.
pub trait Transport: Send + Sync {
    /// Enqueues `message` for `target` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] when the target's queue is unknown or closed.
    fn send(&self, target: &ProcessHandle, message: Message) -> Result<(), SendError>;
}

/// In-process mailboxes keyed by IPC queue identity.
#[derive(Debug, Default)]
pub struct MailboxTransport {
    mailboxes: DashMap<IpcId, mpsc::UnboundedSender<Message>>,
}

impl MailboxTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or replaces) the mailbox for `ipc`, returning its receiving half.
    pub fn open(&self, ipc: IpcId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(ipc, tx);
        rx
    }

    /// Removes the mailbox for `ipc`. Returns `true` if one existed.
    pub fn close(&self, ipc: IpcId) -> bool {
        self.mailboxes.remove(&ipc).is_some()
    }
}

impl Transport for MailboxTransport {
    fn send(&self, target: &ProcessHandle, message: Message) -> Result<(), SendError> {
        let ipc = target.ipc;
        let mailbox = self
            .mailboxes
            .get(&ipc)
            .ok_or(SendError::Unreachable { ipc })?;
        mailbox
            .send(message)
            .map_err(|_| SendError::Disconnected { ipc })
    }
}

#[cfg(test)]
mod tests {
    use discovery_core::messages::ProcessExit;
    use discovery_core::Pid;

    use super::*;

    fn exit(pid: u32) -> Message {
        Message::ProcessExit(ProcessExit { pid: Pid(pid) })
    }

    #[test]
    fn send_reaches_open_mailbox() {
        let transport = MailboxTransport::new();
        let target = ProcessHandle::new(1, IpcId::new());
        let mut rx = transport.open(target.ipc);

        transport.send(&target, exit(9)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), exit(9));
    }

    #[test]
    fn send_to_unknown_ipc_is_unreachable() {
        let transport = MailboxTransport::new();
        let target = ProcessHandle::new(1, IpcId::new());

        assert_eq!(
            transport.send(&target, Message::Shutdown),
            Err(SendError::Unreachable { ipc: target.ipc })
        );
    }

    #[test]
    fn send_after_receiver_dropped_is_disconnected() {
        let transport = MailboxTransport::new();
        let target = ProcessHandle::new(1, IpcId::new());
        drop(transport.open(target.ipc));

        assert_eq!(
            transport.send(&target, Message::Shutdown),
            Err(SendError::Disconnected { ipc: target.ipc })
        );
    }

    #[test]
    fn close_removes_mailbox() {
        let transport = MailboxTransport::new();
        let ipc = IpcId::new();
        let _rx = transport.open(ipc);

        assert!(transport.close(ipc));
        assert!(!transport.close(ipc));
        assert_eq!(
            transport.send(&ProcessHandle::new(1, ipc), Message::Shutdown),
            Err(SendError::Unreachable { ipc })
        );
    }
}
