use crate::controller::{Controller, ControllerError};
use crate::network::types::{AttachmentPoint, RouteHop};

/// Obtains paths from the controller's route service. The controller is the path-computation
/// oracle; this type only checks that what comes back is usable.
#[derive(Debug, derive_new::new)]
pub struct PathResolver<C> {
    controller: C,
}

impl<C: Controller> PathResolver<C> {
    /// Returns the hops from `src` to `dst`.
    ///
    /// Correctness properties of a returned path:
    ///
    /// - It has at least one hop.
    /// - The first hop is on the source's switch.
    /// - The last hop is on the destination's switch.
    pub fn resolve(
        &self,
        src: &AttachmentPoint,
        dst: &AttachmentPoint,
    ) -> Result<Vec<RouteHop>, RouteError> {
        let unavailable = || RouteError::Unavailable {
            src: src.clone(),
            dst: dst.clone(),
        };
        let hops = match self.controller.route(src, dst) {
            Ok(hops) => hops,
            Err(ControllerError::Malformed { call, reason }) => {
                log::warn!("discarding malformed route from {call}: {reason}");
                return Err(unavailable());
            }
            Err(e) => return Err(e.into()),
        };
        // CORRECTNESS: The path must start at the source and end at the destination.
        match (hops.first(), hops.last()) {
            (Some(first), Some(last))
                if first.switch == src.switch && last.switch == dst.switch =>
            {
                Ok(hops)
            }
            (None, _) | (_, None) => Err(unavailable()),
            (Some(first), Some(last)) => {
                log::warn!(
                    "route from {src} to {dst} runs {} -> {}, ignoring it",
                    first.switch,
                    last.switch
                );
                Err(unavailable())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The controller returned no usable path.
    #[error("no route from {src} to {dst}")]
    Unavailable {
        src: AttachmentPoint,
        dst: AttachmentPoint,
    },

    #[error(transparent)]
    Controller(#[from] ControllerError),
}
