//! Floodlight's JSON shapes and their conversion to and from core types.

use labnet_core::{
    flow::{Match, Transport},
    AttachmentPoint, Device, FlowRule, PortNo, RouteHop, SwitchId,
};

/// `GET /wm/device/` answers with a bare array in older releases and wraps it in an object in
/// newer ones.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum DeviceListing {
    Bare(Vec<WireDevice>),
    Wrapped { devices: Vec<WireDevice> },
}

impl DeviceListing {
    pub(crate) fn into_devices(self) -> Vec<Device> {
        let devices = match self {
            DeviceListing::Bare(devices) => devices,
            DeviceListing::Wrapped { devices } => devices,
        };
        devices.into_iter().map(Device::from).collect()
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct WireDevice {
    #[serde(default)]
    mac: Vec<String>,
    #[serde(default)]
    ipv4: Vec<String>,
    #[serde(default, rename = "attachmentPoint")]
    attachment_point: Vec<WireAttachmentPoint>,
}

#[derive(Debug, serde::Deserialize)]
struct WireAttachmentPoint {
    #[serde(rename = "switchDPID", alias = "switch")]
    switch_dpid: String,
    port: WirePort,
}

/// A port as Floodlight reports it: a number, a numeric string, or an object carrying
/// `portNumber`, depending on the release.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum WirePort {
    Number(u32),
    Text(String),
    Object {
        #[serde(rename = "portNumber")]
        port_number: u32,
    },
}

impl WirePort {
    /// Returns `None` for ports that cannot carry traffic to a host, such as `local`.
    pub(crate) fn number(&self) -> Option<PortNo> {
        match self {
            WirePort::Number(n) | WirePort::Object { port_number: n } => Some(PortNo::new(*n)),
            WirePort::Text(s) => s.trim().parse().ok().map(PortNo::new),
        }
    }
}

impl From<WireDevice> for Device {
    fn from(dev: WireDevice) -> Self {
        let attachment_points = dev
            .attachment_point
            .into_iter()
            .filter_map(|ap| {
                let port = ap.port.number()?;
                Some(AttachmentPoint::new(SwitchId::new(ap.switch_dpid), port))
            })
            .collect();
        Device {
            macs: dev.mac,
            ipv4s: dev.ipv4,
            attachment_points,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct WireHop {
    switch: String,
    port: WirePort,
}

/// Converts a route response. A hop without a usable port makes the whole route unusable.
pub(crate) fn route_from_wire(hops: Vec<WireHop>) -> Result<Vec<RouteHop>, String> {
    hops.into_iter()
        .map(|hop| {
            let port = hop.port.number().ok_or_else(|| {
                format!("hop on {} has no usable port: {:?}", hop.switch, hop.port)
            })?;
            Ok(RouteHop::new(SwitchId::new(hop.switch), port))
        })
        .collect()
}

/// A static flow entry as `POST /wm/staticflowpusher/json` expects it.
#[derive(Debug, serde::Serialize)]
pub(crate) struct StaticFlowEntry<'a> {
    switch: &'a str,
    name: &'a str,
    priority: u16,
    eth_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    eth_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv4_src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv4_dst: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_proto: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tcp_src: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tcp_dst: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    udp_src: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    udp_dst: Option<u16>,
    active: &'static str,
    actions: String,
}

impl<'a> From<&'a FlowRule> for StaticFlowEntry<'a> {
    fn from(rule: &'a FlowRule) -> Self {
        let Match {
            eth_type,
            eth_src,
            ipv4_src,
            ipv4_dst,
            l4,
        } = &rule.matches;
        let mut entry = StaticFlowEntry {
            switch: rule.switch.as_str(),
            name: &rule.name,
            priority: rule.priority,
            eth_type: format!("{eth_type:#06x}"),
            eth_src: eth_src.map(|mac| mac.to_string()),
            ipv4_src: ipv4_src.map(|ip| ip.to_string()),
            ipv4_dst: ipv4_dst.map(|ip| ip.to_string()),
            ip_proto: None,
            tcp_src: None,
            tcp_dst: None,
            udp_src: None,
            udp_dst: None,
            active: if rule.active { "true" } else { "false" },
            actions: format!("output={}", rule.output),
        };
        if let Some(l4) = l4 {
            entry.ip_proto = Some(l4.transport.ip_proto());
            match l4.transport {
                Transport::Tcp => {
                    entry.tcp_src = l4.src_port;
                    entry.tcp_dst = l4.dst_port;
                }
                Transport::Udp => {
                    entry.udp_src = l4.src_port;
                    entry.udp_dst = l4.dst_port;
                }
            }
        }
        entry
    }
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct DeleteEntry<'a> {
    pub(crate) name: &'a str,
}

#[cfg(test)]
mod tests;
