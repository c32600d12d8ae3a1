//! Inbound discovery requests: from peer domains and from local clients.

use discovery_core::messages::{
    ApiReply, ApiRequest, Directive, DiscoveryReply, DiscoveryRequest, LookupReply, LookupRequest,
    Scope,
};
use discovery_core::{Ability, Message, ReplyContent};
use tracing::debug;

use super::accumulate::Item;
use super::caller::{Caller, CallerKind};
use super::{external, DiscoveryState};
use crate::coordinate::{self, Progress};

/// A peer asks what this domain provides.
///
/// A `local` directive, or a request that already passed through this
/// domain, is answered from internal providers only. A `forward` directive
/// also reaches peer domains for whatever is not available here.
pub(crate) fn discovery(state: &mut DiscoveryState, request: DiscoveryRequest) {
    if !state.runlevel.is_running() || request.content.is_empty() {
        debug!(runlevel = ?state.runlevel.current(), empty = request.content.is_empty(), "answering empty");
        state.send(
            &request.process,
            Message::DiscoveryReply(DiscoveryReply {
                correlation: request.correlation,
                domain: state.domain.clone(),
                content: ReplyContent::default(),
            }),
        );
        return;
    }

    let mut seen = request.seen;
    if !seen.contains(&request.domain) {
        seen.push(request.domain);
    }
    let scope = if request.directive == Directive::Forward && !seen.contains(&state.domain) {
        Scope::Extended
    } else {
        Scope::Internal
    };
    let caller = Caller::new(
        CallerKind::Discovery,
        request.process,
        request.correlation,
        request.content,
    )
    .with_seen(seen);
    lookup(state, caller, scope);
}

/// A local client asks for content from peer domains.
pub(crate) fn api(state: &mut DiscoveryState, request: ApiRequest) {
    if !state.runlevel.is_running() || request.content.is_empty() {
        debug!(runlevel = ?state.runlevel.current(), empty = request.content.is_empty(), "answering empty");
        state.send(
            &request.process,
            Message::ApiReply(ApiReply {
                correlation: request.correlation,
                content: ReplyContent::default(),
            }),
        );
        return;
    }

    let caller = Caller::new(
        CallerKind::Api,
        request.process,
        request.correlation,
        request.content,
    );
    if state.accumulator.is_enabled() {
        state.accumulate(Item::Api(caller));
    } else {
        external::discover(state, vec![caller], ReplyContent::default());
    }
}

/// Asks every `internal` provider, then answers or escalates.
fn lookup(state: &mut DiscoveryState, caller: Caller, scope: Scope) {
    let process = state.process;
    let content = caller.content.clone();
    let pendings = state.fan_out(Ability::Internal, |correlation| {
        Message::LookupRequest(LookupRequest {
            correlation,
            process,
            scope,
            content: content.clone(),
        })
    });

    coordinate::add(
        state,
        pendings,
        |_: &mut DiscoveryState, _: &LookupReply| Progress::Pending,
        move |state: &mut DiscoveryState, replies: Vec<LookupReply>, _| {
            let known: ReplyContent = replies.into_iter().map(|reply| reply.content).collect();

            // Nothing new is escalated once draining.
            if scope == Scope::Internal
                || known.includes(&caller.content)
                || !state.runlevel.is_running()
            {
                let message = caller.reply(&state.domain, known);
                state.send(&caller.destination.process, message);
                return;
            }

            debug!(missing = caller.content.difference(&known.names()).len(), "escalating to peers");
            if state.accumulator.is_enabled() {
                state.accumulate(Item::Discovery { caller, known });
            } else {
                external::discover(state, vec![caller], known);
            }
        },
    );
}
