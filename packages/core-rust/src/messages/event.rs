//! Process lifecycle events consumed by the engine.

use serde::{Deserialize, Serialize};

use crate::types::{IpcId, Pid};

/// A local process has terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    pub pid: Pid,
}

/// A process' inbound queue has been removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpcDestroyed {
    pub ipc: IpcId,
}
