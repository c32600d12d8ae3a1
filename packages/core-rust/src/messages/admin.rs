//! Configuration and administration payloads.

use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::types::{Correlation, ProcessHandle, Provider};

/// Public aliases a service is reachable by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Origin service name.
    pub service: String,
    pub routes: Vec<String>,
}

impl Route {
    pub fn new<I>(service: impl Into<String>, routes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            service: service.into(),
            routes: routes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Replaces the whole route table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationUpdate {
    pub correlation: Correlation,
    pub process: ProcessHandle,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationReply {
    pub correlation: Correlation,
    /// Why the update was rejected; `None` when applied.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// Engine lifecycle phase as reported to administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Runlevel {
    Startup,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRequest {
    pub correlation: Correlation,
    pub process: ProcessHandle,
}

/// Open coordinator groups per kind of fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenGroups {
    pub lookup: usize,
    pub discovery: usize,
    pub known: usize,
    pub needs: usize,
}

/// Diagnostic snapshot of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub runlevel: Runlevel,
    pub providers: Vec<Provider>,
    /// Content currently out for external discovery, per in-flight request.
    pub pending: Vec<Content>,
    /// Items waiting in the accumulator.
    pub accumulated: usize,
    pub groups: OpenGroups,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReply {
    pub correlation: Correlation,
    pub state: EngineSnapshot,
}
