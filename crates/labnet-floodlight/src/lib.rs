//! This crate contains an implementation of the [`Controller`](labnet_core::Controller) trait for
//! the Floodlight SDN controller. The types here bridge labnet and Floodlight's REST API.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

mod client;
mod wire;

pub use client::{FloodlightController, FloodlightOpts, DEFAULT_BASE_URL};
