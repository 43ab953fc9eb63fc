pub mod traits;
pub mod interfaces;
pub mod multicast;
pub mod memory;

pub use traits::*;
pub use multicast::*;
pub use memory::{MemoryHost, MemoryNetwork, MemoryTransport};
