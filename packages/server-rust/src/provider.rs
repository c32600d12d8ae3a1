//! Registry of local processes that answer discovery abilities.

use discovery_core::{Abilities, Ability, IpcId, Pid, ProcessHandle, Provider};

/// Registered providers in registration order.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `process`, replacing abilities (and queue) of an earlier
    /// registration by the same pid.
    pub fn register(&mut self, process: ProcessHandle, abilities: Abilities) {
        match self
            .providers
            .iter_mut()
            .find(|p| p.process.pid == process.pid)
        {
            Some(existing) => {
                existing.process = process;
                existing.abilities = abilities;
            }
            None => self.providers.push(Provider { process, abilities }),
        }
    }

    /// Providers currently exposing `ability`.
    #[must_use]
    pub fn filter(&self, ability: Ability) -> Vec<Provider> {
        self.providers
            .iter()
            .filter(|p| p.abilities.contains(ability))
            .copied()
            .collect()
    }

    /// Removes the provider with `pid`, if any.
    pub fn remove(&mut self, pid: Pid) -> Option<Provider> {
        let index = self.providers.iter().position(|p| p.process.pid == pid)?;
        Some(self.providers.remove(index))
    }

    /// Removes every provider listening on `ipc`.
    pub fn remove_ipc(&mut self, ipc: IpcId) -> Vec<Provider> {
        let (removed, kept) = self
            .providers
            .drain(..)
            .partition(|p| p.process.ipc == ipc);
        self.providers = kept;
        removed
    }

    #[must_use]
    pub fn all(&self) -> &[Provider] {
        &self.providers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
