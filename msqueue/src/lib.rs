//! A lock-free multi-producer multi-consumer FIFO queue after Michael and
//! Scott, with epoch-based reclamation of detached nodes.

mod node;

pub mod queue;
pub use queue::{ConcurrentQueue, TryIter};
