//! Message schemas for the discovery protocol.
//!
//! Payloads use camelCase field names and survive named `MsgPack`
//! serialization (`rmp_serde::to_vec_named()`), so any transport can carry
//! them. [`Message`] is the closed union the engine dispatches on.

pub mod admin;
pub mod discovery;
pub mod event;
pub mod provider;
pub mod snapshot;
pub mod topology;

use serde::{Deserialize, Serialize};

use crate::types::Correlation;

pub use admin::{
    ConfigurationReply, ConfigurationUpdate, EngineSnapshot, OpenGroups, Route, Runlevel,
    StateReply, StateRequest,
};
pub use discovery::{
    ApiReply, ApiRequest, Directive, DiscoveryReply, DiscoveryRequest, LookupReply, LookupRequest,
    Scope,
};
pub use event::{IpcDestroyed, ProcessExit};
pub use provider::{RegistrationReply, RegistrationRequest};
pub use snapshot::{
    KnownReply, KnownRequest, NeedsReply, NeedsRequest, RediscoveryReply, RediscoveryRequest,
};
pub use topology::{DirectUpdate, Explore, ImplicitUpdate};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Every message the discovery engine sends or receives.
///
/// Internally tagged on `"type"` with `SCREAMING_SNAKE_CASE` variant names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    // -- Providers ---------------------------------------------------------
    RegistrationRequest(RegistrationRequest),
    RegistrationReply(RegistrationReply),

    // -- Discovery ---------------------------------------------------------
    DiscoveryRequest(DiscoveryRequest),
    DiscoveryReply(DiscoveryReply),
    LookupRequest(LookupRequest),
    LookupReply(LookupReply),
    ApiRequest(ApiRequest),
    ApiReply(ApiReply),

    // -- Snapshots ---------------------------------------------------------
    KnownRequest(KnownRequest),
    KnownReply(KnownReply),
    NeedsRequest(NeedsRequest),
    NeedsReply(NeedsReply),
    RediscoveryRequest(RediscoveryRequest),
    RediscoveryReply(RediscoveryReply),

    // -- Topology ----------------------------------------------------------
    DirectUpdate(DirectUpdate),
    ImplicitUpdate(ImplicitUpdate),
    Explore(Explore),

    // -- Lifecycle ---------------------------------------------------------
    ProcessExit(ProcessExit),
    IpcDestroyed(IpcDestroyed),
    ConfigurationUpdate(ConfigurationUpdate),
    ConfigurationReply(ConfigurationReply),
    StateRequest(StateRequest),
    StateReply(StateReply),
    Shutdown,
}

impl Message {
    /// Variant name, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Message::RegistrationRequest(_) => "registration_request",
            Message::RegistrationReply(_) => "registration_reply",
            Message::DiscoveryRequest(_) => "discovery_request",
            Message::DiscoveryReply(_) => "discovery_reply",
            Message::LookupRequest(_) => "lookup_request",
            Message::LookupReply(_) => "lookup_reply",
            Message::ApiRequest(_) => "api_request",
            Message::ApiReply(_) => "api_reply",
            Message::KnownRequest(_) => "known_request",
            Message::KnownReply(_) => "known_reply",
            Message::NeedsRequest(_) => "needs_request",
            Message::NeedsReply(_) => "needs_reply",
            Message::RediscoveryRequest(_) => "rediscovery_request",
            Message::RediscoveryReply(_) => "rediscovery_reply",
            Message::DirectUpdate(_) => "direct_update",
            Message::ImplicitUpdate(_) => "implicit_update",
            Message::Explore(_) => "explore",
            Message::ProcessExit(_) => "process_exit",
            Message::IpcDestroyed(_) => "ipc_destroyed",
            Message::ConfigurationUpdate(_) => "configuration_update",
            Message::ConfigurationReply(_) => "configuration_reply",
            Message::StateRequest(_) => "state_request",
            Message::StateReply(_) => "state_reply",
            Message::Shutdown => "shutdown",
        }
    }
}

// ---------------------------------------------------------------------------
// Correlated
// ---------------------------------------------------------------------------

/// A reply that can be matched to the request it answers.
pub trait Correlated {
    fn correlation(&self) -> Correlation;
}

macro_rules! correlated {
    ($($reply:ty),+ $(,)?) => {
        $(
            impl Correlated for $reply {
                fn correlation(&self) -> Correlation {
                    self.correlation
                }
            }
        )+
    };
}

correlated!(
    RegistrationReply,
    DiscoveryReply,
    LookupReply,
    ApiReply,
    KnownReply,
    NeedsReply,
    RediscoveryReply,
    ConfigurationReply,
    StateReply,
);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
