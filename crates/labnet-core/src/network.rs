//! Where hosts sit on the fabric and how packets get between them, as reported by the controller.

mod inventory;
mod routing;
pub mod types;

pub use inventory::{EndpointResolver, ResolveError};
pub use routing::{PathResolver, RouteError};
pub use types::*;
