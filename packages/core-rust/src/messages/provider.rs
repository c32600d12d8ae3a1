//! Provider registration payloads.

use serde::{Deserialize, Serialize};

use crate::types::{Abilities, Correlation, ProcessHandle};

/// A local process announcing which discovery abilities it answers.
///
/// Re-registering the same process replaces its abilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub correlation: Correlation,
    pub process: ProcessHandle,
    pub abilities: Abilities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReply {
    pub correlation: Correlation,
}
