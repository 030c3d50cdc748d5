mod client;
pub mod context;
mod discover;
mod error;
mod transport;
mod types;

pub use client::{CdpClient, CdpConfig, CdpSession};
pub use context::{ContextRegistry, ExecutionContext};
pub use discover::{DiscoveredTarget, discover};
pub use error::CdpError;
pub use transport::{LifecycleEvent, ReconnectConfig};
pub use types::{CdpEvent, CdpResponse};
