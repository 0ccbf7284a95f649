//! `labnet` grants students in a university network lab access to the services running on lab
//! servers. A request is checked against the course catalog, both hosts are located on the
//! OpenFlow fabric, and a pair of one-way paths is programmed into the switches through the
//! controller. Every connection is registered under a handler which owns its rules, so it can be
//! torn down completely.
//!
//! The most common entry point is [`Pipeline::connect`](core::Pipeline::connect).

#![warn(unreachable_pub, missing_docs)]

pub mod core;
pub mod floodlight;
pub mod utils;
pub mod worker;
