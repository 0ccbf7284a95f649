//! The long-running worker and its client.

pub use labnet_worker::*;
