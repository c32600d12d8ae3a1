//! Identity and capability types shared by every discovery participant.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serializes a `Uuid` as its hyphenated string in every format.
mod uuid_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(value: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let text = String::deserialize(deserializer)?;
        Uuid::parse_str(&text).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Process identities
// ---------------------------------------------------------------------------

/// Operating-system process id of a local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a process' inbound message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpcId(#[serde(with = "uuid_string")] pub Uuid);

impl IpcId {
    /// Generates a fresh, random queue identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IpcId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addressable local process: who it is and where to send to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHandle {
    pub pid: Pid,
    pub ipc: IpcId,
}

impl ProcessHandle {
    #[must_use]
    pub fn new(pid: u32, ipc: IpcId) -> Self {
        Self { pid: Pid(pid), ipc }
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pid, self.ipc)
    }
}

/// Opaque id that ties a reply to its request. Generated by the requester and
/// echoed back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Correlation(#[serde(with = "uuid_string")] pub Uuid);

impl Correlation {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Correlation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one middleware instance (domain).
///
/// Equality is by `id` only; the name is informational and two domains may
/// share a name.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainIdentity {
    #[serde(with = "uuid_string")]
    pub id: Uuid,
    pub name: String,
}

impl DomainIdentity {
    /// Creates a new identity with a random id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

impl PartialEq for DomainIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for DomainIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// ---------------------------------------------------------------------------
// Abilities
// ---------------------------------------------------------------------------

/// A discovery capability a provider can register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Ability {
    /// Answers lookups for what is available inside this domain.
    Internal,
    /// Reaches peer domains (outbound gateway connections).
    External,
    /// Reports what a local subsystem is still waiting for.
    Needs,
    /// Reports a snapshot of everything a local subsystem knows about.
    Known,
    /// Forwards topology notifications upstream.
    Topology,
}

impl Ability {
    pub const ALL: [Ability; 5] = [
        Ability::Internal,
        Ability::External,
        Ability::Needs,
        Ability::Known,
        Ability::Topology,
    ];

    const fn bit(self) -> u8 {
        match self {
            Ability::Internal => 1,
            Ability::External => 1 << 1,
            Ability::Needs => 1 << 2,
            Ability::Known => 1 << 3,
            Ability::Topology => 1 << 4,
        }
    }
}

/// Set of [`Ability`] flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Abilities(u8);

impl Abilities {
    pub const NONE: Abilities = Abilities(0);

    #[must_use]
    pub fn contains(self, ability: Ability) -> bool {
        self.0 & ability.bit() != 0
    }

    pub fn insert(&mut self, ability: Ability) {
        self.0 |= ability.bit();
    }

    /// Iterates the contained abilities in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Ability> {
        Ability::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl From<Ability> for Abilities {
    fn from(ability: Ability) -> Self {
        Abilities(ability.bit())
    }
}

impl FromIterator<Ability> for Abilities {
    fn from_iter<T: IntoIterator<Item = Ability>>(iter: T) -> Self {
        let mut result = Abilities::NONE;
        for ability in iter {
            result.insert(ability);
        }
        result
    }
}

impl BitOr for Ability {
    type Output = Abilities;

    fn bitor(self, rhs: Ability) -> Abilities {
        Abilities(self.bit() | rhs.bit())
    }
}

impl BitOr<Ability> for Abilities {
    type Output = Abilities;

    fn bitor(self, rhs: Ability) -> Abilities {
        Abilities(self.0 | rhs.bit())
    }
}

impl BitOr for Abilities {
    type Output = Abilities;

    fn bitor(self, rhs: Abilities) -> Abilities {
        Abilities(self.0 | rhs.0)
    }
}

/// A local process that answers some discovery abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub process: ProcessHandle,
    pub abilities: Abilities,
}
