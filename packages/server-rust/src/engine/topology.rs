//! Topology propagation.
//!
//! A new outbound connection (direct update) or a change reported from
//! downstream (implicit update) makes this domain ask the affected peers for
//! everything it is interested in, and tells upstream domains in turn. The
//! seen-set on implicit updates carries every domain that already reacted,
//! which stops the notification from circling a cyclic topology.

use discovery_core::messages::{DirectUpdate, Explore, ImplicitUpdate};
use discovery_core::{Ability, Content, Correlation, DomainIdentity, Message, ProcessHandle};
use tracing::debug;

use super::accumulate::Item;
use super::DiscoveryState;

pub(crate) fn direct(state: &mut DiscoveryState, update: DirectUpdate) {
    if !state.runlevel.is_running() {
        debug!(process = %update.process, "ignoring direct update while not running");
        return;
    }
    if state.accumulator.is_enabled() {
        state.accumulate(Item::Direct(update));
    } else {
        explore(state, vec![update], Vec::new());
    }
}

pub(crate) fn implicit(state: &mut DiscoveryState, update: ImplicitUpdate) {
    if update.domains.contains(&state.domain) {
        debug!(process = %update.process, "already seen by this domain, dropping");
        return;
    }
    if !state.runlevel.is_running() {
        debug!(process = %update.process, "ignoring implicit update while not running");
        return;
    }
    if state.accumulator.is_enabled() {
        state.accumulate(Item::Implicit(update));
    } else {
        explore(state, Vec::new(), vec![update]);
    }
}

/// Reacts to a batch of topology updates.
///
/// Upstream is always told, with this domain added to the seen-set. Peers are
/// then asked for the known snapshot plus configured and in-flight content:
/// the connections behind the direct updates, or every `external` provider
/// when only implicit updates arrived.
pub(crate) fn explore(
    state: &mut DiscoveryState,
    direct: Vec<DirectUpdate>,
    implicit: Vec<ImplicitUpdate>,
) {
    if direct.is_empty() && implicit.is_empty() {
        return;
    }

    let mut domains: Vec<DomainIdentity> = implicit
        .into_iter()
        .flat_map(|update| update.domains)
        .chain(std::iter::once(state.domain.clone()))
        .collect();
    domains.sort_by_key(|domain| domain.id);
    domains.dedup_by_key(|domain| domain.id);

    let process = state.process;
    for provider in state.providers.filter(Ability::Topology) {
        state.send(
            &provider.process,
            Message::ImplicitUpdate(ImplicitUpdate {
                process,
                domains: domains.clone(),
            }),
        );
    }

    let configured = direct
        .iter()
        .fold(Content::default(), |all, update| all.union(&update.configured));
    let mut targets: Vec<ProcessHandle> = direct.iter().map(|update| update.process).collect();
    targets.sort_by_key(|process| process.ipc);
    targets.dedup_by_key(|process| process.ipc);

    state.known(move |state, known| {
        let content = state.routes.normalize_request(
            &known
                .names()
                .union(&configured)
                .union(&state.pending.content()),
        );
        if content.is_empty() {
            debug!("nothing to explore");
            return;
        }

        let targets = if targets.is_empty() {
            state
                .providers
                .filter(Ability::External)
                .into_iter()
                .map(|provider| provider.process)
                .collect::<Vec<_>>()
        } else {
            targets
        };

        debug!(targets = targets.len(), content = content.len(), "exploring");
        for target in targets {
            state.send(
                &target,
                Message::Explore(Explore {
                    correlation: Correlation::new(),
                    content: content.clone(),
                }),
            );
        }
    });
}
