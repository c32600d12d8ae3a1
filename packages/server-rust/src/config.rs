//! Configuration types for the discovery server.

use std::time::Duration;

use discovery_core::messages::Route;
use discovery_core::DomainIdentity;
use serde::Serialize;

/// Top-level configuration for one discovery engine.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryConfig {
    /// Identity of the domain this engine serves.
    pub domain: DomainIdentity,
    /// Batching of discovery requests and topology updates.
    pub accumulate: AccumulateConfig,
    /// Route table installed at startup.
    pub routes: Vec<Route>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            domain: DomainIdentity::new("domain"),
            accumulate: AccumulateConfig::default(),
            routes: Vec::new(),
        }
    }
}

/// Debounce settings for the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccumulateConfig {
    /// How long the first item of a batch waits for company. Zero disables
    /// accumulation; every item is then processed as it arrives.
    pub window: Duration,
    /// Batch size that triggers an immediate flush.
    pub limit: usize,
}

impl Default for AccumulateConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(50),
            limit: 100,
        }
    }
}

impl AccumulateConfig {
    /// Accumulation turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            window: Duration::ZERO,
            ..Self::default()
        }
    }
}
