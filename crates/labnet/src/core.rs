//! Core labnet data structures, traits, and routines. The most common entry point is
//! [`Pipeline`], which turns a [request](ConnectRequest) into an installed
//! [connection](Connection).

pub use labnet_core::*;
