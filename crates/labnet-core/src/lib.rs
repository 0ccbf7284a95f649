#![warn(unreachable_pub, missing_debug_implementations)]

//! The core labnet library. This crate defines [the pipeline](Pipeline) that turns an access
//! request into flow rules on an SDN controller, and tears them down again.

#[macro_use]
mod ident;

pub mod catalog;
pub mod constants;
pub mod controller;
pub mod flow;
pub mod install;
pub mod network;
pub mod opts;
pub mod pipeline;
pub mod policy;
pub mod registry;
pub mod request;

#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;

pub use catalog::{Catalog, CatalogError};
pub use controller::{Controller, ControllerError, Device};
pub use flow::{CompileError, FlowRule};
pub use install::{DeleteReport, InstallError, InstallMode, Installer};
pub use network::types::{AttachmentPoint, MacAddr, PortNo, RouteHop, SwitchId, ValidationError};
pub use opts::PipelineOpts;
pub use pipeline::{Error, Pipeline, Teardown};
pub use registry::{Connection, ConnectionRegistry, Handler, RegistryError};
pub use request::{ConnectRequest, NotFoundError};
