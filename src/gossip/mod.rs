pub mod broadcast;
pub mod correlation;
pub mod crdt;
pub mod peers;
pub mod processor;
pub mod retry;
pub mod store;

pub use broadcast::*;
pub use correlation::*;
pub use crdt::*;
pub use peers::*;
pub use processor::*;
pub use retry::*;
pub use store::*;
