//! Discovery core: process identities, the content algebra, and the message
//! schemas shared by the discovery engine and its providers.

pub mod content;
pub mod messages;
pub mod types;

pub use content::{Content, ReplyContent, ReplyQueue, ReplyService, TransactionMode};
pub use messages::{Correlated, Message};
pub use types::{
    Abilities, Ability, Correlation, DomainIdentity, IpcId, Pid, ProcessHandle, Provider,
};
