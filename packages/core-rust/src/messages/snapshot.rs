//! Snapshot queries (`known`, `needs`) and operator-triggered rediscovery.

use serde::{Deserialize, Serialize};

use crate::content::{Content, ReplyContent};
use crate::types::{Correlation, ProcessHandle};

/// Asks a `known` provider for everything it currently knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownRequest {
    pub correlation: Correlation,
    pub process: ProcessHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownReply {
    pub correlation: Correlation,
    pub content: ReplyContent,
}

/// Asks for what local subsystems are still waiting for. Sent by clients to
/// the engine, and by the engine to every `needs` provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedsRequest {
    pub correlation: Correlation,
    pub process: ProcessHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedsReply {
    pub correlation: Correlation,
    pub content: Content,
}

/// Operator request for a full refresh against every peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RediscoveryRequest {
    pub correlation: Correlation,
    pub process: ProcessHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RediscoveryReply {
    pub correlation: Correlation,
    pub content: ReplyContent,
}
