//! The Floodlight [controller](crate::core::Controller).

pub use labnet_floodlight::*;
