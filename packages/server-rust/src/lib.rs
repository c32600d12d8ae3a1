//! Discovery server: fan-out/fan-in coordination of discovery providers,
//! request accumulation, and topology propagation for one domain.

pub mod config;
pub mod coordinate;
pub mod engine;
pub mod pending;
pub mod provider;
pub mod routes;
pub mod runlevel;
pub mod server;
pub mod transport;

pub use config::{AccumulateConfig, DiscoveryConfig};
pub use engine::DiscoveryState;
pub use routes::{ConfigurationError, RouteTable};
pub use runlevel::RunlevelController;
pub use server::{DiscoveryHandle, DiscoveryServer};
pub use transport::{MailboxTransport, SendError, Transport};
