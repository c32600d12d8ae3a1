//! Aggregated external discovery.
//!
//! Held callers are grouped in a [`Shared`] record that lives in an arena on
//! the engine state. A record waits on one or more *flights*: fan-outs of a
//! `DiscoveryRequest` to every `external` provider, each registered in the
//! pending-content tracker. A record that asks for content already in flight
//! joins that flight instead of sending it again, provided the flight already
//! excludes every domain the record's callers came through. Callers are
//! answered as soon as the merged reply covers them, and everyone left is
//! answered with what arrived once the last flight the record waits on
//! completes.
//!
//! Each flight carries the seen-set of its callers plus this domain. Peers
//! listed there answer from their own providers only, so a wait never leads
//! back to a domain already waiting on it.

use std::collections::{BTreeMap, BTreeSet};

use discovery_core::messages::{DiscoveryReply, DiscoveryRequest, Directive};
use discovery_core::{Ability, Content, Correlation, DomainIdentity, Message, ReplyContent};
use tracing::{debug, trace};

use super::caller::Caller;
use super::DiscoveryState;
use crate::coordinate::{self, Outcome, Progress};

/// Callers waiting on the same flights.
#[derive(Debug)]
pub(crate) struct Shared {
    callers: Vec<Caller>,
    /// Everything resolved so far, route-expanded.
    reply: ReplyContent,
    /// Flights this record still waits on.
    depends: BTreeSet<Correlation>,
}

/// One open fan-out to the `external` providers.
#[derive(Debug)]
struct Flight {
    /// Domains the request was sent on behalf of, this one included.
    seen: Vec<DomainIdentity>,
    /// What came back so far, for late joiners.
    received: ReplyContent,
}

/// Owns every open [`Shared`] record, addressed by a stable id.
#[derive(Debug, Default)]
pub(crate) struct SharedArena {
    records: BTreeMap<u64, Shared>,
    flights: BTreeMap<Correlation, Flight>,
    next: u64,
}

impl SharedArena {
    fn insert(&mut self, record: Shared) -> u64 {
        let id = self.next;
        self.next += 1;
        self.records.insert(id, record);
        id
    }

    /// Records waiting on `flight`.
    fn dependents(&self, flight: Correlation) -> Vec<u64> {
        self.records
            .iter()
            .filter(|(_, record)| record.depends.contains(&flight))
            .map(|(id, _)| *id)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// Starts external discovery for `callers`, given what local lookups already
/// resolved for them.
pub(crate) fn discover(state: &mut DiscoveryState, callers: Vec<Caller>, known: ReplyContent) {
    if callers.is_empty() {
        return;
    }

    let requested = callers
        .iter()
        .fold(Content::default(), |all, caller| all.union(&caller.content));
    let wanted = state
        .routes
        .normalize_request(&requested.difference(&known.names()));
    let seen = merge_seen(callers.iter().flat_map(|caller| caller.seen.iter().cloned()));

    let joinable: Vec<(Correlation, Content)> = state
        .pending
        .entries()
        .into_iter()
        .filter(|(flight, _)| {
            state
                .shared
                .flights
                .get(flight)
                .is_some_and(|open| seen.iter().all(|domain| open.seen.contains(domain)))
        })
        .collect();

    let mut depends: BTreeSet<Correlation> = joinable
        .iter()
        .filter(|(_, content)| content.intersects(&wanted))
        .map(|(flight, _)| *flight)
        .collect();

    let reply = depends
        .iter()
        .filter_map(|flight| state.shared.flights.get(flight))
        .fold(known, |all, open| all.union(&open.received));

    let in_flight = joinable
        .iter()
        .fold(Content::default(), |all, (_, content)| all.union(content));
    let outgoing = wanted.difference(&in_flight);
    let flight = (!outgoing.is_empty()).then(Correlation::new);
    if let Some(flight) = flight {
        depends.insert(flight);
    }

    debug!(
        callers = callers.len(),
        wanted = wanted.len(),
        outgoing = outgoing.len(),
        joined = depends.len() - usize::from(flight.is_some()),
        "external discovery"
    );

    let id = state.shared.insert(Shared {
        callers,
        reply,
        depends,
    });
    satisfy(state, id);

    match flight {
        Some(flight) => {
            let seen = merge_seen(seen.into_iter().chain(std::iter::once(state.domain.clone())));
            launch(state, flight, outgoing, seen);
        }
        None => settle(state, id),
    }
}

/// Sends all of `content` to every `external` provider on behalf of one
/// caller who is answered only when every provider has replied.
pub(crate) fn rediscover(state: &mut DiscoveryState, caller: Caller, content: Content) {
    let flight = Correlation::new();
    state.shared.insert(Shared {
        callers: vec![caller],
        reply: ReplyContent::default(),
        depends: BTreeSet::from([flight]),
    });
    let seen = vec![state.domain.clone()];
    launch(state, flight, content, seen);
}

/// Sorted by id, without duplicates.
fn merge_seen(domains: impl Iterator<Item = DomainIdentity>) -> Vec<DomainIdentity> {
    let mut seen: Vec<DomainIdentity> = domains.collect();
    seen.sort_by_key(|domain| domain.id);
    seen.dedup_by_key(|domain| domain.id);
    seen
}

/// Fans `content` out to every `external` provider as `flight`.
fn launch(
    state: &mut DiscoveryState,
    flight: Correlation,
    content: Content,
    seen: Vec<DomainIdentity>,
) {
    let guard = state.pending.insert(flight, content.clone());
    state.shared.flights.insert(
        flight,
        Flight {
            seen: seen.clone(),
            received: ReplyContent::default(),
        },
    );

    let process = state.process;
    let domain = state.domain.clone();
    let pendings = state.fan_out(Ability::External, |correlation| {
        Message::DiscoveryRequest(DiscoveryRequest {
            correlation,
            process,
            domain: domain.clone(),
            directive: Directive::Forward,
            content: content.clone(),
            seen: seen.clone(),
        })
    });

    coordinate::add(
        state,
        pendings,
        move |state: &mut DiscoveryState, reply: &DiscoveryReply| progress(state, flight, reply),
        move |state: &mut DiscoveryState, _replies: Vec<DiscoveryReply>, outcome| {
            drop(guard);
            complete(state, flight, outcome);
        },
    );
}

/// Merges one reply into every record waiting on `flight`. The flight is done
/// once none of those records has a caller left.
fn progress(state: &mut DiscoveryState, flight: Correlation, reply: &DiscoveryReply) -> Progress {
    let content = state.routes.normalize_reply(&reply.content);
    trace!(%flight, domain = %reply.domain, "discovery reply");

    if let Some(open) = state.shared.flights.get_mut(&flight) {
        open.received = open.received.union(&content);
    }

    let mut waiting = false;
    for id in state.shared.dependents(flight) {
        if let Some(record) = state.shared.records.get_mut(&id) {
            record.reply = record.reply.union(&content);
        }
        satisfy(state, id);
        waiting |= state
            .shared
            .records
            .get(&id)
            .is_some_and(|record| !record.callers.is_empty());
    }

    if waiting {
        Progress::Pending
    } else {
        Progress::Done
    }
}

/// `flight` is over: records that waited on nothing else are finished.
fn complete(state: &mut DiscoveryState, flight: Correlation, outcome: Outcome) {
    debug!(%flight, ?outcome, "flight complete");
    state.shared.flights.remove(&flight);
    for id in state.shared.dependents(flight) {
        if let Some(record) = state.shared.records.get_mut(&id) {
            record.depends.remove(&flight);
        }
        settle(state, id);
    }
}

/// Answers every caller of record `id` that the merged reply now covers.
fn satisfy(state: &mut DiscoveryState, id: u64) {
    let Some(record) = state.shared.records.get_mut(&id) else {
        return;
    };
    let (ready, waiting): (Vec<Caller>, Vec<Caller>) = std::mem::take(&mut record.callers)
        .into_iter()
        .partition(|caller| caller.is_satisfied_by(&record.reply));
    record.callers = waiting;

    let replies: Vec<_> = ready
        .iter()
        .map(|caller| {
            (
                caller.destination.process,
                caller.reply(&state.domain, caller.answer(&record.reply)),
            )
        })
        .collect();
    for (target, message) in replies {
        state.send(&target, message);
    }
}

/// Finishes record `id` if it waits on no flight, answering whoever is left
/// with whatever arrived.
fn settle(state: &mut DiscoveryState, id: u64) {
    if state
        .shared
        .records
        .get(&id)
        .is_some_and(|record| !record.depends.is_empty())
    {
        return;
    }
    let Some(record) = state.shared.records.remove(&id) else {
        return;
    };

    if !record.callers.is_empty() {
        debug!(callers = record.callers.len(), "answering with what arrived");
    }
    for caller in &record.callers {
        let content = caller.answer(&record.reply);
        state.send(&caller.destination.process, caller.reply(&state.domain, content));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use discovery_core::messages::{ApiRequest, Directive, RegistrationRequest, Route};
    use discovery_core::{
        Ability, Content, Correlation, DomainIdentity, IpcId, Message, ProcessHandle,
        ReplyContent, ReplyService,
    };
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::config::{AccumulateConfig, DiscoveryConfig};
    use crate::engine::fixture::{accumulating, services, wanted, Fixture};
    use crate::engine::DiscoveryState;
    use crate::transport::MailboxTransport;

    #[test]
    fn routed_request_round_trips_through_aliases() {
        let mut fixture = Fixture::with(
            AccumulateConfig::disabled(),
            vec![Route::new("svc", ["public-svc"])],
        );
        let mut external = fixture.provider(Ability::External);
        let mut client = fixture.peer();

        fixture.request(&client, Directive::Forward, wanted(&["public-svc"]));

        let request = external.discovery();
        assert_eq!(request.content, wanted(&["svc"]));

        let mut origin = ReplyService::new("svc");
        origin.hops = 1;
        fixture.discovery_reply(request.correlation, ReplyContent::new(vec![origin], vec![]));

        let reply = client.discovery_reply();
        assert_eq!(reply.content.names(), wanted(&["public-svc"]));
        assert_eq!(reply.content.services()[0].hops, 1);
    }

    #[test]
    fn unreachable_provider_shrinks_the_group() {
        let mut fixture = Fixture::new();
        let gone = fixture.provider(Ability::External);
        let mut reachable = fixture.provider(Ability::External);
        let mut client = fixture.peer();
        drop(gone);

        fixture.api(&client, wanted(&["A"]));
        let request = reachable.discovery();
        fixture.discovery_reply(request.correlation, services(&["A"]));

        assert_eq!(client.api_reply().1.names(), wanted(&["A"]));
        assert!(fixture.state.is_idle());
    }

    #[test]
    fn no_external_providers_answers_empty_at_once() {
        let mut fixture = Fixture::new();
        let mut client = fixture.peer();

        fixture.api(&client, wanted(&["A"]));
        assert!(client.api_reply().1.is_empty());
        assert!(fixture.state.snapshot().pending.is_empty());
    }

    #[test]
    fn concurrent_callers_join_the_flight_in_progress() {
        let mut fixture = Fixture::new();
        let mut first = fixture.provider(Ability::External);
        let mut second = fixture.provider(Ability::External);
        let mut early = fixture.peer();
        let mut late = fixture.peer();

        fixture.api(&early, wanted(&["A", "B"]));
        let to_first = first.discovery();
        let to_second = second.discovery();
        assert_eq!(fixture.state.snapshot().pending, vec![wanted(&["A", "B"])]);

        fixture.discovery_reply(to_first.correlation, services(&["A"]));

        // Already in flight: nothing new is sent, and what arrived is reused.
        fixture.api(&late, wanted(&["A"]));
        assert!(first.is_quiet());
        assert!(second.is_quiet());
        assert_eq!(late.api_reply().1.names(), wanted(&["A"]));

        fixture.discovery_reply(to_second.correlation, services(&["B"]));
        assert_eq!(early.api_reply().1.names(), wanted(&["A", "B"]));
        assert!(fixture.state.is_idle());
    }

    #[test]
    fn joining_caller_sends_only_what_is_not_in_flight() {
        let mut fixture = Fixture::new();
        let mut external = fixture.provider(Ability::External);
        let mut early = fixture.peer();
        let mut late = fixture.peer();

        fixture.api(&early, wanted(&["A"]));
        let first = external.discovery();

        fixture.api(&late, wanted(&["A", "B"]));
        let second = external.discovery();
        assert_eq!(second.content, wanted(&["B"]));

        fixture.discovery_reply(second.correlation, services(&["B"]));
        assert!(late.is_quiet());

        fixture.discovery_reply(first.correlation, services(&["A"]));
        assert_eq!(early.api_reply().1.names(), wanted(&["A"]));
        assert_eq!(late.api_reply().1.names(), wanted(&["A", "B"]));
    }

    #[test]
    fn stragglers_after_early_completion_are_discarded() {
        let mut fixture = Fixture::new();
        let mut fast = fixture.provider(Ability::External);
        let mut slow = fixture.provider(Ability::External);
        let mut client = fixture.peer();

        fixture.api(&client, wanted(&["A"]));
        let to_fast = fast.discovery();
        let to_slow = slow.discovery();

        fixture.discovery_reply(to_fast.correlation, services(&["A"]));
        assert_eq!(client.api_reply().1.names(), wanted(&["A"]));
        assert!(fixture.state.is_idle());

        fixture.discovery_reply(to_slow.correlation, services(&["A"]));
        assert!(client.is_quiet());
    }

    #[test]
    fn mixed_alias_batch_answers_each_caller_by_its_own_names() {
        let mut fixture = Fixture::with(accumulating(), vec![Route::new("svc", ["public-svc"])]);
        let mut external = fixture.provider(Ability::External);
        let mut aliased = fixture.peer();
        let mut plain = fixture.peer();
        let mut origin = fixture.peer();

        fixture.api(&aliased, wanted(&["public-svc"]));
        fixture.api(&plain, wanted(&["other"]));
        fixture.api(&origin, wanted(&["svc"]));
        fixture.state.timeout();

        let request = external.discovery();
        assert_eq!(request.content, wanted(&["other", "svc"]));
        assert!(external.is_quiet());

        fixture.discovery_reply(request.correlation, services(&["other", "svc"]));

        assert_eq!(aliased.api_reply().1.names(), wanted(&["public-svc"]));
        assert_eq!(plain.api_reply().1.names(), wanted(&["other"]));
        // A routed origin is published under its aliases only.
        assert!(origin.api_reply().1.is_empty());
        assert!(fixture.state.is_idle());
    }

    #[test]
    fn forwarded_request_starts_its_own_flight() {
        let mut fixture = Fixture::new();
        let mut external = fixture.provider(Ability::External);
        let mut local = fixture.peer();
        let mut remote = fixture.peer();

        fixture.api(&local, wanted(&["A"]));
        let first = external.discovery();
        assert_eq!(first.seen, vec![fixture.state.domain().clone()]);

        // No internal providers: the lookup completes at once and escalates.
        fixture.request(&remote, Directive::Forward, wanted(&["A"]));
        let second = external.discovery();
        assert_eq!(second.content, wanted(&["A"]));
        assert_eq!(second.seen.len(), 2);
        assert!(second.seen.contains(fixture.state.domain()));

        fixture.discovery_reply(second.correlation, services(&["A"]));
        assert_eq!(remote.discovery_reply().content.names(), wanted(&["A"]));
        fixture.discovery_reply(first.correlation, services(&["A"]));
        assert_eq!(local.api_reply().1.names(), wanted(&["A"]));
        assert!(fixture.state.is_idle());
    }

    /// A whole engine with its own mailbox.
    struct Domain {
        state: DiscoveryState,
        inbox: UnboundedReceiver<Message>,
    }

    impl Domain {
        fn new(transport: &Arc<MailboxTransport>, name: &str, pid: u32) -> Self {
            let process = ProcessHandle::new(pid, IpcId::new());
            let inbox = transport.open(process.ipc);
            let config = DiscoveryConfig {
                domain: DomainIdentity::new(name),
                accumulate: AccumulateConfig::disabled(),
                routes: Vec::new(),
            };
            let state = DiscoveryState::new(config, process, transport.clone()).unwrap();
            state.start();
            Self { state, inbox }
        }

        /// Registers `peer` as this domain's gateway to another domain.
        fn connect(&mut self, peer: &Domain) {
            self.state.handle(Message::RegistrationRequest(RegistrationRequest {
                correlation: Correlation::new(),
                process: peer.state.process(),
                abilities: Ability::External.into(),
            }));
        }

        fn ask(&mut self, client: ProcessHandle, name: &str) -> Correlation {
            let correlation = Correlation::new();
            self.state.handle(Message::ApiRequest(ApiRequest {
                correlation,
                process: client,
                content: Content::services_only([name]),
            }));
            correlation
        }

        fn drain(&mut self) -> bool {
            let mut handled = false;
            while let Ok(message) = self.inbox.try_recv() {
                self.state.handle(message);
                handled = true;
            }
            handled
        }
    }

    /// Delivers messages between `a` and `b` until both are quiet.
    fn pump(a: &mut Domain, b: &mut Domain) {
        for _ in 0..64 {
            if !(a.drain() | b.drain()) {
                return;
            }
        }
        panic!("domains never went quiet");
    }

    fn expect_empty_reply(inbox: &mut UnboundedReceiver<Message>, correlation: Correlation) {
        match inbox.try_recv() {
            Ok(Message::ApiReply(reply)) => {
                assert_eq!(reply.correlation, correlation);
                assert!(reply.content.is_empty());
            }
            other => panic!("expected api reply, got {other:?}"),
        }
    }

    #[test]
    fn domains_forwarding_to_each_other_still_answer() {
        let transport = Arc::new(MailboxTransport::new());
        let mut a = Domain::new(&transport, "a", 10);
        let mut b = Domain::new(&transport, "b", 20);
        a.connect(&b);
        b.connect(&a);

        let client = ProcessHandle::new(30, IpcId::new());
        let mut inbox = transport.open(client.ipc);
        let correlation = a.ask(client, "X");
        pump(&mut a, &mut b);

        expect_empty_reply(&mut inbox, correlation);
        assert!(a.state.is_idle());
        assert!(b.state.is_idle());
    }

    #[test]
    fn callers_on_both_sides_of_a_cycle_are_answered() {
        let transport = Arc::new(MailboxTransport::new());
        let mut a = Domain::new(&transport, "a", 10);
        let mut b = Domain::new(&transport, "b", 20);
        a.connect(&b);
        b.connect(&a);

        let client_a = ProcessHandle::new(30, IpcId::new());
        let client_b = ProcessHandle::new(31, IpcId::new());
        let mut inbox_a = transport.open(client_a.ipc);
        let mut inbox_b = transport.open(client_b.ipc);

        // Both flights are out before either domain sees the other's request.
        let asked_a = a.ask(client_a, "X");
        let asked_b = b.ask(client_b, "X");
        pump(&mut a, &mut b);

        expect_empty_reply(&mut inbox_a, asked_a);
        expect_empty_reply(&mut inbox_b, asked_b);
        assert!(a.state.is_idle());
        assert!(b.state.is_idle());
        assert!(a.state.snapshot().pending.is_empty());
        assert!(b.state.snapshot().pending.is_empty());
    }
}
