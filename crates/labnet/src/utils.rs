//! Reading and writing catalog files.

pub use labnet_utils::*;
