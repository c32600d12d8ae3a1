//! Topology change notifications.

use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::types::{Correlation, DomainIdentity, ProcessHandle};

/// A new outbound connection was established locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUpdate {
    /// The connection (gateway outbound) that can now reach the peer.
    pub process: ProcessHandle,
    /// What the connection is configured to serve.
    #[serde(default)]
    pub configured: Content,
}

/// Something changed further downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplicitUpdate {
    pub process: ProcessHandle,
    /// Every domain that has already seen this notification.
    #[serde(default)]
    pub domains: Vec<DomainIdentity>,
}

/// Asks a connection to discover `content` on its peer, fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explore {
    pub correlation: Correlation,
    pub content: Content,
}
