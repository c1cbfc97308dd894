//! Reachability monitoring: probing, state tracking, discovery and the
//! scheduling loop that ties them together.

pub mod device;
pub mod discovery;
pub mod executor;
pub mod prober;
pub mod scanner;
pub mod slug;
pub mod topics;
pub mod tracker;
