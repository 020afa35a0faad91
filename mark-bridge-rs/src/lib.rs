pub mod across;
mod adapter;
pub mod cctp;
mod error;
pub mod evm;
mod registry;

pub use adapter::{BridgeAdapter, ResolvedRoute, SendLeg};
pub use error::BridgeError;
pub use registry::Registry;
