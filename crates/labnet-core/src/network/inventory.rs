use std::net::Ipv4Addr;

use crate::controller::{Controller, ControllerError, Device};
use crate::network::types::{AttachmentPoint, Endpoint, MacAddr};

/// Maps hosts to their attachment points using the controller's device inventory.
#[derive(Debug, derive_new::new)]
pub struct EndpointResolver<C> {
    controller: C,
}

impl<C: Controller> EndpointResolver<C> {
    /// Finds the attachment point of the device owning `mac`.
    pub fn resolve_by_mac(&self, mac: MacAddr) -> Result<AttachmentPoint, ResolveError> {
        self.resolve(Endpoint::Mac(mac), |dev| dev.macs.iter().any(|m| mac.matches(m)))
    }

    /// Finds the attachment point of the device owning `ip`.
    pub fn resolve_by_ip(&self, ip: Ipv4Addr) -> Result<AttachmentPoint, ResolveError> {
        self.resolve(Endpoint::Ip(ip), |dev| {
            dev.ipv4s
                .iter()
                .any(|s| s.trim().parse::<Ipv4Addr>().is_ok_and(|addr| addr == ip))
        })
    }

    // A device can be seen on several ports; only the first listed one is used.
    fn resolve(
        &self,
        endpoint: Endpoint,
        owns: impl Fn(&Device) -> bool,
    ) -> Result<AttachmentPoint, ResolveError> {
        let devices = self.controller.devices()?;
        devices
            .into_iter()
            .find(|dev| owns(dev))
            .and_then(|dev| dev.attachment_points.into_iter().next())
            .ok_or(ResolveError::NotFound(endpoint))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The endpoint is not in the controller's inventory.
    #[error("{0} is not attached to the fabric")]
    NotFound(Endpoint),

    #[error(transparent)]
    Controller(#[from] ControllerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::{PortNo, SwitchId};
    use crate::testing::{self, FakeController};

    fn ap(switch: &str, port: u32) -> AttachmentPoint {
        AttachmentPoint::new(SwitchId::new(switch), PortNo::new(port))
    }

    #[test]
    fn mac_lookup_ignores_case() {
        let controller = FakeController::new().with_device(
            &["AA:BB:CC:00:00:01"],
            &["10.0.0.1"],
            vec![ap(testing::S1, 3)],
        );
        let resolver = EndpointResolver::new(&controller);
        let mac = "aa:bb:cc:00:00:01".parse().unwrap();
        assert_eq!(resolver.resolve_by_mac(mac).unwrap(), ap(testing::S1, 3));
    }

    #[test]
    fn first_attachment_point_wins() {
        let controller = FakeController::new().with_device(
            &[],
            &["10.0.0.9"],
            vec![ap(testing::S2, 7), ap(testing::S1, 1)],
        );
        let resolver = EndpointResolver::new(&controller);
        let found = resolver.resolve_by_ip(Ipv4Addr::new(10, 0, 0, 9)).unwrap();
        assert_eq!(found, ap(testing::S2, 7));
    }

    #[test]
    fn device_without_attachment_point_is_not_found() {
        let controller = FakeController::new().with_device(&[], &["10.0.0.9"], Vec::new());
        let resolver = EndpointResolver::new(&controller);
        assert!(matches!(
            resolver.resolve_by_ip(Ipv4Addr::new(10, 0, 0, 9)),
            Err(ResolveError::NotFound(Endpoint::Ip(_)))
        ));
    }

    #[test]
    fn missing_device_is_not_found() {
        let controller = FakeController::new();
        let resolver = EndpointResolver::new(&controller);
        let mac = "aa:bb:cc:00:00:01".parse().unwrap();
        assert!(matches!(
            resolver.resolve_by_mac(mac),
            Err(ResolveError::NotFound(Endpoint::Mac(_)))
        ));
    }

    #[test]
    fn unreachable_controller_is_distinct_from_not_found() {
        let controller = FakeController::new().unreachable();
        let resolver = EndpointResolver::new(&controller);
        assert!(matches!(
            resolver.resolve_by_ip(Ipv4Addr::new(10, 0, 0, 9)),
            Err(ResolveError::Controller(ControllerError::Transport { .. }))
        ));
    }
}
