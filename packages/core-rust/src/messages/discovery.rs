//! Discovery request/reply payloads: inter-domain discovery, internal lookups,
//! and local client (API) discovery.

use serde::{Deserialize, Serialize};

use crate::content::{Content, ReplyContent};
use crate::types::{Correlation, DomainIdentity, ProcessHandle};

// ---------------------------------------------------------------------------
// Inter-domain discovery
// ---------------------------------------------------------------------------

/// Whether an inbound discovery request stays inside the domain or may be
/// forwarded to peer domains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Directive {
    #[default]
    Local,
    Forward,
}

/// Asks "who provides this content". Sent by peers (via inbound gateways) and
/// by the engine itself to every `external` provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub correlation: Correlation,
    /// Where the reply goes.
    pub process: ProcessHandle,
    /// Domain that sent the request.
    pub domain: DomainIdentity,
    #[serde(default)]
    pub directive: Directive,
    pub content: Content,
    /// Every domain the request has already passed through. A domain that
    /// finds itself here answers from its own providers only.
    #[serde(default)]
    pub seen: Vec<DomainIdentity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReply {
    pub correlation: Correlation,
    /// Domain that answered.
    pub domain: DomainIdentity,
    pub content: ReplyContent,
}

// ---------------------------------------------------------------------------
// Internal lookup
// ---------------------------------------------------------------------------

/// How far the lookup that triggered an internal request will reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    /// Only this domain is consulted.
    #[default]
    Internal,
    /// Peer domains are consulted for whatever this domain lacks.
    Extended,
}

/// Sent by the engine to every `internal` provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub correlation: Correlation,
    pub process: ProcessHandle,
    pub scope: Scope,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupReply {
    pub correlation: Correlation,
    pub content: ReplyContent,
}

// ---------------------------------------------------------------------------
// Local client discovery
// ---------------------------------------------------------------------------

/// A local client asking the engine to discover content in peer domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub correlation: Correlation,
    pub process: ProcessHandle,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReply {
    pub correlation: Correlation,
    pub content: ReplyContent,
}
