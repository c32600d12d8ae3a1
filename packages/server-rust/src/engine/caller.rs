//! A request held by the engine until it can be answered.

use discovery_core::messages::{ApiReply, DiscoveryReply, RediscoveryReply};
use discovery_core::{Content, Correlation, DomainIdentity, Message, ProcessHandle, ReplyContent};

/// Where a reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Destination {
    pub process: ProcessHandle,
    pub correlation: Correlation,
}

/// Which reply a held caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallerKind {
    /// An extended discovery request from a peer domain.
    Discovery,
    /// A local client.
    Api,
    /// An operator refresh; answered only when every provider has replied.
    Rediscovery,
}

#[derive(Debug, Clone)]
pub(crate) struct Caller {
    pub destination: Destination,
    pub kind: CallerKind,
    /// What was asked for, aliases preserved.
    pub content: Content,
    /// Domains the request already passed through on its way here.
    pub seen: Vec<DomainIdentity>,
}

impl Caller {
    pub fn new(
        kind: CallerKind,
        process: ProcessHandle,
        correlation: Correlation,
        content: Content,
    ) -> Self {
        Self {
            destination: Destination {
                process,
                correlation,
            },
            kind,
            content,
            seen: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_seen(mut self, seen: Vec<DomainIdentity>) -> Self {
        self.seen = seen;
        self
    }

    /// `true` when `reply` already answers everything this caller asked for.
    /// Rediscovery callers are never satisfied early.
    pub fn is_satisfied_by(&self, reply: &ReplyContent) -> bool {
        self.kind != CallerKind::Rediscovery && reply.includes(&self.content)
    }

    /// The part of `reply` this caller gets to see.
    pub fn answer(&self, reply: &ReplyContent) -> ReplyContent {
        match self.kind {
            CallerKind::Rediscovery => reply.clone(),
            CallerKind::Discovery | CallerKind::Api => reply.filter(&self.content),
        }
    }

    /// The reply message carrying `content`.
    pub fn reply(&self, domain: &DomainIdentity, content: ReplyContent) -> Message {
        let correlation = self.destination.correlation;
        match self.kind {
            CallerKind::Discovery => Message::DiscoveryReply(DiscoveryReply {
                correlation,
                domain: domain.clone(),
                content,
            }),
            CallerKind::Api => Message::ApiReply(ApiReply {
                correlation,
                content,
            }),
            CallerKind::Rediscovery => Message::RediscoveryReply(RediscoveryReply {
                correlation,
                content,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use discovery_core::{IpcId, ReplyService};

    use super::*;

    fn reply(names: &[&str]) -> ReplyContent {
        ReplyContent::new(names.iter().map(|n| ReplyService::new(*n)).collect(), vec![])
    }

    fn caller(kind: CallerKind, services: &[&str]) -> Caller {
        Caller::new(
            kind,
            ProcessHandle::new(1, IpcId::new()),
            Correlation::new(),
            Content::services_only(services.iter().copied()),
        )
    }

    #[test]
    fn api_caller_sees_only_its_request() {
        let caller = caller(CallerKind::Api, &["a"]);
        let all = reply(&["a", "b"]);

        assert!(caller.is_satisfied_by(&all));
        assert_eq!(caller.answer(&all).names(), Content::services_only(["a"]));
    }

    #[test]
    fn rediscovery_caller_waits_and_sees_everything() {
        let caller = caller(CallerKind::Rediscovery, &["a"]);
        let all = reply(&["a", "b"]);

        assert!(!caller.is_satisfied_by(&all));
        assert_eq!(caller.answer(&all), all);
    }

    #[test]
    fn reply_echoes_correlation() {
        let caller = caller(CallerKind::Discovery, &["a"]);
        let domain = DomainIdentity::new("here");
        match caller.reply(&domain, reply(&["a"])) {
            Message::DiscoveryReply(reply) => {
                assert_eq!(reply.correlation, caller.destination.correlation);
                assert_eq!(reply.domain, domain);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
