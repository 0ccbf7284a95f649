use labnet_core::{
    catalog::{Protocol, Service},
    flow, testing, Handler,
};
use serde_json::json;

use super::*;

fn handler() -> Handler {
    "c3-q8w2ze".parse().unwrap()
}

fn compiled(service: &Service) -> Vec<FlowRule> {
    flow::compile(
        &handler(),
        &testing::path(2),
        testing::student_mac(),
        testing::server_ip(),
        service,
    )
    .unwrap()
}

#[test]
fn bare_device_listing_decodes() -> anyhow::Result<()> {
    let body = json!([
        {
            "mac": ["aa:bb:cc:00:00:01"],
            "ipv4": ["10.0.0.1"],
            "attachmentPoint": [{"switchDPID": testing::S1, "port": 3}]
        },
        {"mac": ["aa:bb:cc:00:00:09"], "ipv4": [], "attachmentPoint": []}
    ]);
    let devices = serde_json::from_value::<DeviceListing>(body)?.into_devices();
    assert_eq!(devices.len(), 2);
    assert_eq!(
        devices[0].attachment_points,
        vec![AttachmentPoint::new(SwitchId::new(testing::S1), PortNo::new(3))]
    );
    assert!(devices[1].attachment_points.is_empty());
    Ok(())
}

#[test]
fn wrapped_device_listing_decodes() -> anyhow::Result<()> {
    let body = json!({
        "devices": [{
            "mac": ["aa:bb:cc:00:00:01"],
            "attachmentPoint": [{"switch": testing::S2, "port": "7"}]
        }]
    });
    let devices = serde_json::from_value::<DeviceListing>(body)?.into_devices();
    assert_eq!(devices.len(), 1);
    assert!(devices[0].ipv4s.is_empty());
    assert_eq!(devices[0].attachment_points[0].port, PortNo::new(7));
    Ok(())
}

#[test]
fn unusable_ports_are_dropped() -> anyhow::Result<()> {
    let body = json!([{
        "mac": ["aa:bb:cc:00:00:01"],
        "attachmentPoint": [
            {"switchDPID": testing::S1, "port": "local"},
            {"switchDPID": testing::S2, "port": {"portNumber": 4}}
        ]
    }]);
    let devices = serde_json::from_value::<DeviceListing>(body)?.into_devices();
    assert_eq!(
        devices[0].attachment_points,
        vec![AttachmentPoint::new(SwitchId::new(testing::S2), PortNo::new(4))]
    );
    Ok(())
}

#[test]
fn route_keeps_hop_order() -> anyhow::Result<()> {
    let body = json!([
        {"switch": testing::S1, "port": 1},
        {"switch": testing::S2, "port": {"portNumber": 2}},
        {"switch": testing::S3, "port": "3"}
    ]);
    let hops = route_from_wire(serde_json::from_value(body)?).unwrap();
    let summary = hops
        .iter()
        .map(|h| (h.switch.as_str(), h.port.inner()))
        .collect::<Vec<_>>();
    assert_eq!(summary, vec![(testing::S1, 1), (testing::S2, 2), (testing::S3, 3)]);
    Ok(())
}

#[test]
fn route_with_unusable_port_is_rejected() -> anyhow::Result<()> {
    let body = json!([{"switch": testing::S1, "port": "local"}]);
    assert!(route_from_wire(serde_json::from_value(body)?).is_err());
    Ok(())
}

#[test]
fn tcp_forward_entry_serializes() -> anyhow::Result<()> {
    let rules = compiled(&Service::new("ssh", Protocol::Tcp, 22));
    let entry = StaticFlowEntry::from(&rules[0]);
    assert_eq!(
        serde_json::to_value(&entry)?,
        json!({
            "switch": testing::S1,
            "name": "c3-q8w2ze_fw_0",
            "priority": 40000,
            "eth_type": "0x0800",
            "eth_src": "aa:bb:cc:00:00:01",
            "ipv4_dst": "10.0.0.3",
            "ip_proto": 6,
            "tcp_dst": 22,
            "active": "true",
            "actions": "output=2"
        })
    );
    Ok(())
}

#[test]
fn udp_reverse_entry_serializes() -> anyhow::Result<()> {
    let rules = compiled(&Service::new("dns", Protocol::Udp, 53));
    let entry = StaticFlowEntry::from(&rules[1]);
    assert_eq!(
        serde_json::to_value(&entry)?,
        json!({
            "switch": testing::S1,
            "name": "c3-q8w2ze_bw_0",
            "priority": 40000,
            "eth_type": "0x0800",
            "ipv4_src": "10.0.0.3",
            "ip_proto": 17,
            "udp_src": 53,
            "active": "true",
            "actions": "output=1"
        })
    );
    Ok(())
}

#[test]
fn arp_entry_has_no_l3_fields() -> anyhow::Result<()> {
    let rules = compiled(&Service::new("ssh", Protocol::Tcp, 22));
    let arp = rules.last().unwrap();
    assert_eq!(
        serde_json::to_value(StaticFlowEntry::from(arp))?,
        json!({
            "switch": testing::S2,
            "name": "c3-q8w2ze_arp_fw_1",
            "priority": 30000,
            "eth_type": "0x0806",
            "active": "true",
            "actions": "output=2"
        })
    );
    Ok(())
}
