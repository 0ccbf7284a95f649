//! The interface to the SDN controller. The pipeline never computes paths or programs switches
//! itself; everything remote goes through a [`Controller`].

use crate::flow::FlowRule;
use crate::network::types::{AttachmentPoint, RouteHop};

/// An interface for SDN controllers.
///
/// Implementations must apply their own request timeouts; a call that times out is reported as
/// [`ControllerError::Timeout`].
pub trait Controller {
    /// Returns the controller's device inventory.
    fn devices(&self) -> Result<Vec<Device>, ControllerError>;

    /// Asks the controller for the ordered hops between two attachment points.
    fn route(
        &self,
        src: &AttachmentPoint,
        dst: &AttachmentPoint,
    ) -> Result<Vec<RouteHop>, ControllerError>;

    /// Installs a rule. A success return means the controller acknowledged it.
    fn push_flow(&self, rule: &FlowRule) -> Result<(), ControllerError>;

    /// Removes a rule by name. Removing a name the controller does not know is a success.
    fn delete_flow(&self, name: &str) -> Result<(), ControllerError>;
}

impl<C: Controller + ?Sized> Controller for &C {
    fn devices(&self) -> Result<Vec<Device>, ControllerError> {
        (**self).devices()
    }

    fn route(
        &self,
        src: &AttachmentPoint,
        dst: &AttachmentPoint,
    ) -> Result<Vec<RouteHop>, ControllerError> {
        (**self).route(src, dst)
    }

    fn push_flow(&self, rule: &FlowRule) -> Result<(), ControllerError> {
        (**self).push_flow(rule)
    }

    fn delete_flow(&self, name: &str) -> Result<(), ControllerError> {
        (**self).delete_flow(name)
    }
}

/// A device record from the controller's inventory. Addresses are kept as reported; callers
/// parse what they need to compare.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    pub macs: Vec<String>,
    pub ipv4s: Vec<String>,
    pub attachment_points: Vec<AttachmentPoint>,
}

/// A failed controller call. `call` names the request, e.g. `GET /wm/device/`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// No response within the configured timeout.
    #[error("{call} timed out")]
    Timeout { call: String },

    /// The request never completed.
    #[error("{call} failed: {reason}")]
    Transport { call: String, reason: String },

    /// The controller answered with a non-success status.
    #[error("{call} returned status {status}: {body}")]
    Status {
        call: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("{call} returned a malformed response: {reason}")]
    Malformed { call: String, reason: String },
}

impl ControllerError {
    /// Whether the request may have taken effect on the controller even though it failed.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, ControllerError::Timeout { .. } | ControllerError::Transport { .. })
    }
}
