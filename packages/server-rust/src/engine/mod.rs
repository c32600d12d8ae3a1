//! The discovery engine: all state of one domain's discovery, mutated only by
//! the dispatch loop, one message or timer at a time.
//!
//! [`DiscoveryState::handle`] is the single switch over [`Message`]; every
//! cross-process wait is a group registered with one of the coordinators, so
//! no handler ever blocks.

mod accumulate;
mod caller;
mod external;
mod rediscovery;
mod request;
mod topology;

use std::sync::Arc;

use discovery_core::messages::{
    ConfigurationReply, ConfigurationUpdate, DiscoveryReply, EngineSnapshot, KnownReply,
    KnownRequest, LookupReply, NeedsReply, OpenGroups, RegistrationReply, RegistrationRequest,
    Runlevel, StateReply, StateRequest,
};
use discovery_core::{Ability, Correlation, DomainIdentity, Message, ProcessHandle, ReplyContent};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn};

use self::accumulate::{Accumulator, Flush, Item};
use self::external::SharedArena;
use crate::config::DiscoveryConfig;
use crate::coordinate::{self, Coordinates, Coordinator, Pendings, Progress};
use crate::pending::PendingContent;
use crate::provider::ProviderRegistry;
use crate::routes::{ConfigurationError, RouteTable};
use crate::runlevel::RunlevelController;
use crate::transport::Transport;

/// One coordinator per reply type the engine waits for.
#[derive(Debug, Default)]
struct Coordinate {
    lookup: Coordinator<LookupReply, DiscoveryState>,
    discovery: Coordinator<DiscoveryReply, DiscoveryState>,
    known: Coordinator<KnownReply, DiscoveryState>,
    needs: Coordinator<NeedsReply, DiscoveryState>,
}

/// Discovery engine state.
pub struct DiscoveryState {
    domain: DomainIdentity,
    /// Our own queue; providers reply here.
    process: ProcessHandle,
    runlevel: RunlevelController,
    transport: Arc<dyn Transport>,
    providers: ProviderRegistry,
    routes: RouteTable,
    pending: PendingContent,
    accumulator: Accumulator,
    shared: SharedArena,
    coordinate: Coordinate,
}

impl std::fmt::Debug for DiscoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryState")
            .field("domain", &self.domain)
            .field("process", &self.process)
            .field("runlevel", &self.runlevel.current())
            .field("providers", &self.providers.len())
            .field("pending", &self.pending.len())
            .field("accumulated", &self.accumulator.len())
            .field("shared", &self.shared.len())
            .finish_non_exhaustive()
    }
}

impl Coordinates<LookupReply> for DiscoveryState {
    fn coordinator(&mut self) -> &mut Coordinator<LookupReply, Self> {
        &mut self.coordinate.lookup
    }
}

impl Coordinates<DiscoveryReply> for DiscoveryState {
    fn coordinator(&mut self) -> &mut Coordinator<DiscoveryReply, Self> {
        &mut self.coordinate.discovery
    }
}

impl Coordinates<KnownReply> for DiscoveryState {
    fn coordinator(&mut self) -> &mut Coordinator<KnownReply, Self> {
        &mut self.coordinate.known
    }
}

impl Coordinates<NeedsReply> for DiscoveryState {
    fn coordinator(&mut self) -> &mut Coordinator<NeedsReply, Self> {
        &mut self.coordinate.needs
    }
}

impl DiscoveryState {
    /// Creates an engine in `Startup` that answers on `process`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the configured routes are invalid.
    pub fn new(
        config: DiscoveryConfig,
        process: ProcessHandle,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigurationError> {
        let routes = RouteTable::new(&config.routes)?;
        Ok(Self {
            domain: config.domain,
            process,
            runlevel: RunlevelController::new(),
            transport,
            providers: ProviderRegistry::new(),
            routes,
            pending: PendingContent::new(),
            accumulator: Accumulator::new(config.accumulate),
            shared: SharedArena::default(),
            coordinate: Coordinate::default(),
        })
    }

    /// Starts serving requests.
    pub fn start(&self) {
        self.runlevel.set_running();
    }

    #[must_use]
    pub fn domain(&self) -> &DomainIdentity {
        &self.domain
    }

    #[must_use]
    pub fn process(&self) -> ProcessHandle {
        self.process
    }

    #[must_use]
    pub fn runlevel(&self) -> &RunlevelController {
        &self.runlevel
    }

    /// Handles one inbound message.
    pub fn handle(&mut self, message: Message) {
        let span = info_span!("discovery", kind = message.kind());
        let _entered = span.enter();

        match message {
            Message::RegistrationRequest(request) => self.registration(request),
            Message::DiscoveryRequest(request) => request::discovery(self, request),
            Message::ApiRequest(request) => request::api(self, request),
            Message::RediscoveryRequest(request) => rediscovery::request(self, request),
            Message::NeedsRequest(request) => rediscovery::needs(self, request),
            Message::DirectUpdate(update) => topology::direct(self, update),
            Message::ImplicitUpdate(update) => topology::implicit(self, update),
            Message::LookupReply(reply) => {
                coordinate::deliver(self, reply);
            }
            Message::DiscoveryReply(reply) => {
                coordinate::deliver(self, reply);
            }
            Message::KnownReply(reply) => {
                coordinate::deliver(self, reply);
            }
            Message::NeedsReply(reply) => {
                coordinate::deliver(self, reply);
            }
            Message::ProcessExit(event) => {
                if let Some(provider) = self.providers.remove(event.pid) {
                    debug!(process = %provider.process, "provider exited");
                }
                self.failed(|process| process.pid == event.pid);
            }
            Message::IpcDestroyed(event) => {
                for provider in self.providers.remove_ipc(event.ipc) {
                    debug!(process = %provider.process, "provider queue destroyed");
                }
                self.failed(|process| process.ipc == event.ipc);
            }
            Message::ConfigurationUpdate(update) => self.configuration(update),
            Message::StateRequest(request) => self.state_request(request),
            Message::Shutdown => self.shutdown(),
            other @ (Message::RegistrationReply(_)
            | Message::LookupRequest(_)
            | Message::ApiReply(_)
            | Message::KnownRequest(_)
            | Message::RediscoveryReply(_)
            | Message::Explore(_)
            | Message::ConfigurationReply(_)
            | Message::StateReply(_)) => {
                warn!(kind = other.kind(), "unexpected message");
            }
        }

        self.settle();
    }

    /// When the accumulated batch is due.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.accumulator.deadline()
    }

    /// Processes the accumulated batch. A no-op when nothing is accumulated.
    pub fn timeout(&mut self) {
        let mut batch = self.accumulator.extract();
        if batch.is_empty() {
            return;
        }
        debug!(items = batch.len(), "flushing accumulated batch");

        let callers = batch.callers();
        external::discover(self, callers, batch.known);
        topology::explore(self, batch.direct, batch.implicit);

        self.settle();
    }

    /// `true` when nothing is accumulated and no fan-out is open.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.accumulator.is_empty()
            && self.coordinate.lookup.is_empty()
            && self.coordinate.discovery.is_empty()
            && self.coordinate.known.is_empty()
            && self.coordinate.needs.is_empty()
    }

    /// Diagnostic view of the engine.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            runlevel: self.runlevel.current(),
            providers: self.providers.all().to_vec(),
            pending: self
                .pending
                .entries()
                .into_iter()
                .map(|(_, content)| content)
                .collect(),
            accumulated: self.accumulator.len(),
            groups: OpenGroups {
                lookup: self.coordinate.lookup.len(),
                discovery: self.coordinate.discovery.len(),
                known: self.coordinate.known.len(),
                needs: self.coordinate.needs.len(),
            },
            routes: self.routes.routes(),
        }
    }

    // -- plumbing ------------------------------------------------------------

    /// Sends `message` to `target`. Failures are logged and reported as `false`.
    fn send(&self, target: &ProcessHandle, message: Message) -> bool {
        let kind = message.kind();
        match self.transport.send(target, message) {
            Ok(()) => true,
            Err(error) => {
                warn!(%target, kind, %error, "send failed");
                false
            }
        }
    }

    /// Sends one message per provider with `ability`. Providers that cannot be
    /// reached are left out of the returned group.
    fn fan_out(&self, ability: Ability, build: impl Fn(Correlation) -> Message) -> Pendings {
        let mut pendings = Pendings::new();
        for provider in self.providers.filter(ability) {
            let correlation = Correlation::new();
            if self.send(&provider.process, build(correlation)) {
                pendings.insert(correlation, provider.process);
            }
        }
        debug!(?ability, sent = pendings.len(), "fan-out");
        pendings
    }

    /// Collects a snapshot from every `known` provider, then runs `then`.
    fn known<F>(&mut self, then: F)
    where
        F: FnOnce(&mut DiscoveryState, ReplyContent) + Send + 'static,
    {
        let process = self.process;
        let pendings = self.fan_out(Ability::Known, |correlation| {
            Message::KnownRequest(KnownRequest {
                correlation,
                process,
            })
        });
        coordinate::add(
            self,
            pendings,
            |_: &mut DiscoveryState, _: &KnownReply| Progress::Pending,
            move |state: &mut DiscoveryState, replies: Vec<KnownReply>, _| {
                let known = replies.into_iter().map(|reply| reply.content).collect();
                then(state, known);
            },
        );
    }

    /// Queues `item` for the next flush, flushing now if the batch is full.
    fn accumulate(&mut self, item: Item) {
        if self.accumulator.add(item) == Flush::Now {
            debug!("accumulator full");
            self.timeout();
        }
    }

    fn failed(&mut self, gone: impl Fn(&ProcessHandle) -> bool + Copy) {
        coordinate::failed::<LookupReply, _>(self, gone);
        coordinate::failed::<DiscoveryReply, _>(self, gone);
        coordinate::failed::<KnownReply, _>(self, gone);
        coordinate::failed::<NeedsReply, _>(self, gone);
    }

    /// Draining and idle means stopped.
    fn settle(&mut self) {
        if self.runlevel.current() == Runlevel::Draining && self.is_idle() {
            self.runlevel.stop();
        }
    }

    // -- administrative handlers ----------------------------------------------

    fn registration(&mut self, request: RegistrationRequest) {
        info!(
            process = %request.process,
            abilities = ?request.abilities.iter().collect::<Vec<_>>(),
            "provider registered"
        );
        self.providers.register(request.process, request.abilities);
        self.send(
            &request.process,
            Message::RegistrationReply(RegistrationReply {
                correlation: request.correlation,
            }),
        );
    }

    fn configuration(&mut self, update: ConfigurationUpdate) {
        let error = match RouteTable::new(&update.routes) {
            Ok(routes) => {
                info!(routes = update.routes.len(), "route table replaced");
                self.routes = routes;
                None
            }
            Err(error) => {
                warn!(%error, "configuration rejected, keeping current routes");
                Some(error.to_string())
            }
        };
        self.send(
            &update.process,
            Message::ConfigurationReply(ConfigurationReply {
                correlation: update.correlation,
                error,
            }),
        );
    }

    fn state_request(&mut self, request: StateRequest) {
        let state = self.snapshot();
        self.send(
            &request.process,
            Message::StateReply(StateReply {
                correlation: request.correlation,
                state,
            }),
        );
    }

    fn shutdown(&mut self) {
        self.runlevel.drain();
        // Whatever was accumulated is processed now rather than on the timer.
        self.timeout();
    }
}
