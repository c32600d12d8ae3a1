//! Async host for one engine.
//!
//! A single task owns the [`DiscoveryState`] and drives it from its inbound
//! mailbox and the accumulation deadline. Everything else talks to it through
//! a [`DiscoveryHandle`].

use std::sync::Arc;

use arc_swap::ArcSwap;
use discovery_core::messages::Runlevel;
use discovery_core::{IpcId, Message, ProcessHandle};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::info;

use crate::config::DiscoveryConfig;
use crate::engine::DiscoveryState;
use crate::routes::ConfigurationError;
use crate::transport::{MailboxTransport, SendError, Transport};

/// The dispatch loop. Consumed by [`DiscoveryServer::run`].
#[derive(Debug)]
pub struct DiscoveryServer {
    state: DiscoveryState,
    inbound: mpsc::UnboundedReceiver<Message>,
    transport: Arc<MailboxTransport>,
}

/// Cheap, cloneable access to a running server.
#[derive(Debug, Clone)]
pub struct DiscoveryHandle {
    process: ProcessHandle,
    transport: Arc<MailboxTransport>,
    level: Arc<ArcSwap<Runlevel>>,
    signal: watch::Receiver<Runlevel>,
}

impl DiscoveryServer {
    /// Creates the engine and opens its mailbox on `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the configured routes are invalid.
    pub fn new(
        config: DiscoveryConfig,
        transport: Arc<MailboxTransport>,
    ) -> Result<(Self, DiscoveryHandle), ConfigurationError> {
        let process = ProcessHandle::new(std::process::id(), IpcId::new());
        let state = DiscoveryState::new(config, process, transport.clone())?;
        let inbound = transport.open(process.ipc);

        let handle = DiscoveryHandle {
            process,
            transport: Arc::clone(&transport),
            level: state.runlevel().handle(),
            signal: state.runlevel().subscribe(),
        };
        Ok((
            Self {
                state,
                inbound,
                transport,
            },
            handle,
        ))
    }

    /// Serves until the engine stops, then closes the mailbox.
    pub async fn run(mut self) {
        self.state.start();
        info!(
            domain = %self.state.domain(),
            process = %self.state.process(),
            "discovery server running"
        );

        while self.state.runlevel().current() != Runlevel::Stopped {
            let deadline = self.state.deadline();
            tokio::select! {
                message = self.inbound.recv() => match message {
                    Some(message) => self.state.handle(message),
                    None => break,
                },
                () = expire(deadline) => self.state.timeout(),
            }
        }

        self.transport.close(self.state.process().ipc);
        info!("discovery server stopped");
    }
}

/// Resolves at `deadline`, or never.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl DiscoveryHandle {
    /// Where the server receives its messages.
    #[must_use]
    pub fn process(&self) -> ProcessHandle {
        self.process
    }

    /// Enqueues `message` for the server.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] once the server has stopped.
    pub fn send(&self, message: Message) -> Result<(), SendError> {
        self.transport.send(&self.process, message)
    }

    #[must_use]
    pub fn runlevel(&self) -> Runlevel {
        **self.level.load()
    }

    /// Asks the server to drain and stop.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] once the server has stopped.
    pub fn shutdown(&self) -> Result<(), SendError> {
        self.send(Message::Shutdown)
    }

    /// Waits until the server reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut signal = self.signal.clone();
        // A dropped sender means the server is gone.
        let _ = signal.wait_for(|level| *level == Runlevel::Stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use discovery_core::messages::{ApiRequest, DiscoveryReply, RegistrationRequest};
    use discovery_core::{
        Ability, Content, Correlation, DomainIdentity, ReplyContent, ReplyService,
    };

    use super::*;

    fn start(transport: &Arc<MailboxTransport>) -> (tokio::task::JoinHandle<()>, DiscoveryHandle) {
        let (server, handle) =
            DiscoveryServer::new(DiscoveryConfig::default(), Arc::clone(transport)).unwrap();
        (tokio::spawn(server.run()), handle)
    }

    fn api(process: ProcessHandle, name: &str) -> (Correlation, Message) {
        let correlation = Correlation::new();
        let message = Message::ApiRequest(ApiRequest {
            correlation,
            process,
            content: Content::services_only([name]),
        });
        (correlation, message)
    }

    #[tokio::test(start_paused = true)]
    async fn serves_until_shutdown() {
        let transport = Arc::new(MailboxTransport::new());
        let (task, handle) = start(&transport);

        let client = ProcessHandle::new(7, IpcId::new());
        let mut inbox = transport.open(client.ipc);

        // No external providers: answered empty once the batch flushes.
        let (correlation, request) = api(client, "A");
        handle.send(request).unwrap();
        match inbox.recv().await.unwrap() {
            Message::ApiReply(reply) => {
                assert_eq!(reply.correlation, correlation);
                assert!(reply.content.is_empty());
            }
            other => panic!("expected api reply, got {other:?}"),
        }
        assert_eq!(handle.runlevel(), Runlevel::Running);

        handle.shutdown().unwrap();
        handle.stopped().await;
        task.await.unwrap();

        assert_eq!(handle.runlevel(), Runlevel::Stopped);
        assert!(handle.send(Message::Shutdown).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_one_batch_for_many_clients() {
        let transport = Arc::new(MailboxTransport::new());
        let (task, handle) = start(&transport);

        let peer = ProcessHandle::new(8, IpcId::new());
        let mut peer_inbox = transport.open(peer.ipc);
        handle
            .send(Message::RegistrationRequest(RegistrationRequest {
                correlation: Correlation::new(),
                process: peer,
                abilities: Ability::External.into(),
            }))
            .unwrap();
        assert!(matches!(
            peer_inbox.recv().await,
            Some(Message::RegistrationReply(_))
        ));

        let mut clients = Vec::new();
        for (pid, name) in [(9, "A"), (10, "B")] {
            let client = ProcessHandle::new(pid, IpcId::new());
            let inbox = transport.open(client.ipc);
            let (_, request) = api(client, name);
            handle.send(request).unwrap();
            clients.push((inbox, name));
        }

        let Some(Message::DiscoveryRequest(request)) = peer_inbox.recv().await else {
            panic!("expected one discovery request");
        };
        assert_eq!(request.content, Content::services_only(["A", "B"]));
        assert_eq!(request.process, handle.process());

        handle
            .send(Message::DiscoveryReply(DiscoveryReply {
                correlation: request.correlation,
                domain: DomainIdentity::new("peer"),
                content: ReplyContent::new(
                    vec![ReplyService::new("A"), ReplyService::new("B")],
                    vec![],
                ),
            }))
            .unwrap();

        for (inbox, name) in &mut clients {
            match inbox.recv().await.unwrap() {
                Message::ApiReply(reply) => {
                    assert_eq!(reply.content.names(), Content::services_only([*name]));
                }
                other => panic!("expected api reply, got {other:?}"),
            }
        }
        assert!(peer_inbox.try_recv().is_err());

        handle.shutdown().unwrap();
        task.await.unwrap();
    }
}
