mod balance;
mod bridge;
mod earmark;
mod invoice;
mod rebalance;
mod transaction;

pub use balance::*;
pub use bridge::*;
pub use earmark::*;
pub use invoice::*;
pub use rebalance::*;
pub use transaction::*;
