//! Operator-triggered refresh, and the needs query.

use discovery_core::messages::{NeedsReply, NeedsRequest, RediscoveryReply, RediscoveryRequest};
use discovery_core::{Ability, Content, Message, ReplyContent};
use tracing::debug;

use super::caller::{Caller, CallerKind};
use super::{external, DiscoveryState};
use crate::coordinate::{self, Progress};

/// Asks peers again for everything known locally plus whatever is in flight.
/// The reply waits for every `external` provider.
pub(crate) fn request(state: &mut DiscoveryState, request: RediscoveryRequest) {
    if !state.runlevel.is_running() {
        debug!(runlevel = ?state.runlevel.current(), "answering empty");
        state.send(
            &request.process,
            Message::RediscoveryReply(RediscoveryReply {
                correlation: request.correlation,
                content: ReplyContent::default(),
            }),
        );
        return;
    }

    let process = request.process;
    let correlation = request.correlation;
    state.known(move |state, known| {
        let content = state
            .routes
            .normalize_request(&known.names().union(&state.pending.content()));
        let caller = Caller::new(CallerKind::Rediscovery, process, correlation, content.clone());

        if content.is_empty() {
            debug!("nothing to rediscover");
            let message = caller.reply(&state.domain, ReplyContent::default());
            state.send(&process, message);
            return;
        }

        debug!(content = content.len(), "rediscovery");
        external::rediscover(state, caller, content);
    });
}

/// Union of what every `needs` provider is still waiting for.
pub(crate) fn needs(state: &mut DiscoveryState, request: NeedsRequest) {
    let process = state.process;
    let pendings = state.fan_out(Ability::Needs, |correlation| {
        Message::NeedsRequest(NeedsRequest {
            correlation,
            process,
        })
    });

    coordinate::add(
        state,
        pendings,
        |_: &mut DiscoveryState, _: &NeedsReply| Progress::Pending,
        move |state: &mut DiscoveryState, replies: Vec<NeedsReply>, _| {
            let content = replies
                .iter()
                .fold(Content::default(), |all, reply| all.union(&reply.content));
            state.send(
                &request.process,
                Message::NeedsReply(NeedsReply {
                    correlation: request.correlation,
                    content,
                }),
            );
        },
    );
}

#[cfg(test)]
mod tests {
    use discovery_core::messages::{KnownReply, NeedsReply, NeedsRequest, RediscoveryRequest};
    use discovery_core::{Ability, Content, Correlation, Message, ReplyContent};

    use crate::engine::fixture::{services, wanted, Fixture};

    #[test]
    fn rediscovery_waits_for_every_peer() {
        let mut fixture = Fixture::new();
        let mut known = fixture.provider(Ability::Known);
        let mut first = fixture.provider(Ability::External);
        let mut second = fixture.provider(Ability::External);
        let mut operator = fixture.peer();

        let correlation = Correlation::new();
        fixture.state.handle(Message::RediscoveryRequest(RediscoveryRequest {
            correlation,
            process: operator.process,
        }));

        let snapshot = known.known();
        fixture.state.handle(Message::KnownReply(KnownReply {
            correlation: snapshot,
            content: services(&["A"]),
        }));

        let to_first = first.discovery();
        let to_second = second.discovery();
        assert_eq!(to_first.content, wanted(&["A"]));

        fixture.discovery_reply(to_first.correlation, services(&["A"]));
        assert!(operator.is_quiet());

        fixture.discovery_reply(to_second.correlation, ReplyContent::default());
        match operator.recv() {
            Message::RediscoveryReply(reply) => {
                assert_eq!(reply.correlation, correlation);
                assert_eq!(reply.content.names(), wanted(&["A"]));
            }
            other => panic!("expected rediscovery reply, got {other:?}"),
        }
    }

    #[test]
    fn rediscovery_with_nothing_known_answers_empty() {
        let mut fixture = Fixture::new();
        let mut external = fixture.provider(Ability::External);
        let mut operator = fixture.peer();

        fixture.state.handle(Message::RediscoveryRequest(RediscoveryRequest {
            correlation: Correlation::new(),
            process: operator.process,
        }));

        assert!(matches!(operator.recv(), Message::RediscoveryReply(reply) if reply.content.is_empty()));
        assert!(external.is_quiet());
    }

    #[test]
    fn needs_are_merged_across_providers() {
        let mut fixture = Fixture::new();
        let mut first = fixture.provider(Ability::Needs);
        let mut second = fixture.provider(Ability::Needs | Ability::Internal);
        let mut operator = fixture.peer();

        fixture.state.handle(Message::NeedsRequest(NeedsRequest {
            correlation: Correlation::new(),
            process: operator.process,
        }));

        for (peer, names) in [(&mut first, ["a", "b"]), (&mut second, ["b", "c"])] {
            let Message::NeedsRequest(request) = peer.recv() else {
                panic!("expected needs request");
            };
            fixture.state.handle(Message::NeedsReply(NeedsReply {
                correlation: request.correlation,
                content: Content::services_only(names),
            }));
        }

        assert!(matches!(operator.recv(), Message::NeedsReply(reply) if reply.content == wanted(&["a", "b", "c"])));
    }
}
