//! Fixtures and an in-memory controller for tests.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::catalog::{
    Catalog, Course, CourseStatus, Grant, Protocol, Server, Service, Student, StudentCode,
};
use crate::controller::{Controller, ControllerError, Device};
use crate::flow::FlowRule;
use crate::network::types::{AttachmentPoint, MacAddr, PortNo, RouteHop, SwitchId};

pub const S1: &str = "00:00:00:00:00:00:00:01";
pub const S2: &str = "00:00:00:00:00:00:00:02";
pub const S3: &str = "00:00:00:00:00:00:00:03";

pub const STUDENT: StudentCode = StudentCode::new(20201234);
pub const OTHER_STUDENT: StudentCode = StudentCode::new(20205678);

pub fn student_mac() -> MacAddr {
    MacAddr::new([0xaa, 0xbb, 0xcc, 0x00, 0x00, 0x01])
}

pub fn student_ip() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 1)
}

pub fn server_ip() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 3)
}

pub fn dpid(i: usize) -> String {
    format!("00:00:00:00:00:00:00:{:02x}", i)
}

/// A path across `nr_hops` switches, entering the first one on port 1.
pub fn path(nr_hops: usize) -> Vec<RouteHop> {
    (0..nr_hops)
        .map(|i| {
            let port = if i == 0 && nr_hops > 1 { 1 } else { 2 };
            RouteHop::new(SwitchId::new(dpid(i + 1)), PortNo::new(port))
        })
        .collect()
}

/// Two students, two servers and two courses. Student 20201234 may reach `ssh` on `srv-ssh`
/// through CS101. CS102 would also grant `ftp`, but it is closed.
pub fn catalog() -> Catalog {
    let students = vec![
        Student::new(STUDENT, "Ana Torres", student_mac()),
        Student::new(
            OTHER_STUDENT,
            "Luis Rojas",
            MacAddr::new([0xaa, 0xbb, 0xcc, 0x00, 0x00, 0x02]),
        ),
    ];
    let servers = vec![
        Server::new(
            "srv-ssh",
            server_ip(),
            vec![
                Service::new("ssh", Protocol::Tcp, 22),
                Service::new("ftp", Protocol::Tcp, 21),
            ],
        ),
        Server::new(
            "srv-dns",
            Ipv4Addr::new(10, 0, 0, 4),
            vec![Service::new("dns", Protocol::Udp, 53)],
        ),
    ];
    let courses = vec![
        Course::builder()
            .code("CS101")
            .status(CourseStatus::Dictando)
            .name("Redes")
            .roster([STUDENT].into_iter().collect())
            .grants(vec![Grant::new("srv-ssh", ["ssh"])])
            .build(),
        Course::builder()
            .code("CS102")
            .status(CourseStatus::Closed)
            .name("Sistemas Operativos")
            .roster([STUDENT, OTHER_STUDENT].into_iter().collect())
            .grants(vec![
                Grant::new("srv-ssh", ["ssh", "ftp"]),
                Grant::new("srv-dns", ["dns"]),
            ])
            .build(),
    ];
    // Fixture data is consistent.
    Catalog::new(students, courses, servers).unwrap()
}

/// A controller that knows the fixture student and server and routes between them over
/// `nr_hops` switches.
pub fn fabric(nr_hops: usize) -> FakeController {
    let hops = path(nr_hops);
    let first = &hops[0];
    let last = &hops[nr_hops - 1];
    FakeController::new()
        .with_device(
            &[&student_mac().to_string()],
            &[&student_ip().to_string()],
            vec![AttachmentPoint::new(first.switch.clone(), PortNo::new(1))],
        )
        .with_device(
            &[],
            &[&server_ip().to_string()],
            vec![AttachmentPoint::new(last.switch.clone(), last.port)],
        )
        .with_route(hops)
}

/// A remote call seen by a [`FakeController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Devices,
    Route,
    Push(String),
    Delete(String),
}

/// An in-memory controller. Installed rules are kept by name; failures are injected with the
/// builder methods.
#[derive(Debug, Default)]
pub struct FakeController {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    devices: Vec<Device>,
    route: Vec<RouteHop>,
    installed: BTreeMap<String, FlowRule>,
    calls: Vec<Call>,
    nr_pushes: usize,
    unreachable: bool,
    fail_push_at: Option<usize>,
    time_out_push_at: Option<usize>,
    delete_delay: Option<Duration>,
    fail_delete_of: FxHashSet<String>,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, macs: &[&str], ipv4s: &[&str], aps: Vec<AttachmentPoint>) -> Self {
        self.state.lock().devices.push(Device {
            macs: macs.iter().map(|s| s.to_string()).collect(),
            ipv4s: ipv4s.iter().map(|s| s.to_string()).collect(),
            attachment_points: aps,
        });
        self
    }

    pub fn with_route(self, hops: Vec<RouteHop>) -> Self {
        self.state.lock().route = hops;
        self
    }

    /// Every call fails as if the controller were down.
    pub fn unreachable(self) -> Self {
        self.state.lock().unreachable = true;
        self
    }

    /// The `n`-th push (counting from 1) is rejected with status 500.
    pub fn fail_push_at(self, n: usize) -> Self {
        self.state.lock().fail_push_at = Some(n);
        self
    }

    /// The `n`-th push (counting from 1) is applied, but the caller sees a timeout.
    pub fn time_out_push_at(self, n: usize) -> Self {
        self.state.lock().time_out_push_at = Some(n);
        self
    }

    /// Every delete takes `delay` before it is applied.
    pub fn slow_deletes(self, delay: Duration) -> Self {
        self.state.lock().delete_delay = Some(delay);
        self
    }

    /// Deleting `name` is rejected with status 500.
    pub fn fail_delete_of(self, name: impl Into<String>) -> Self {
        self.state.lock().fail_delete_of.insert(name.into());
        self
    }

    /// Names of the rules currently installed, sorted.
    pub fn installed(&self) -> Vec<String> {
        self.state.lock().installed.keys().cloned().collect()
    }

    pub fn installed_rule(&self, name: &str) -> Option<FlowRule> {
        self.state.lock().installed.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Names of attempted pushes, in call order.
    pub fn pushes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Push(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Names of attempted deletes, in call order.
    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn down(call: &str) -> ControllerError {
        ControllerError::Transport {
            call: call.to_owned(),
            reason: "connection refused".to_owned(),
        }
    }

    fn rejected(call: &str) -> ControllerError {
        ControllerError::Status {
            call: call.to_owned(),
            status: 500,
            body: "internal error".to_owned(),
        }
    }
}

impl Controller for FakeController {
    fn devices(&self) -> Result<Vec<Device>, ControllerError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Devices);
        if state.unreachable {
            return Err(Self::down("GET /wm/device/"));
        }
        Ok(state.devices.clone())
    }

    fn route(
        &self,
        _src: &AttachmentPoint,
        _dst: &AttachmentPoint,
    ) -> Result<Vec<RouteHop>, ControllerError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Route);
        if state.unreachable {
            return Err(Self::down("GET /wm/topology/route"));
        }
        Ok(state.route.clone())
    }

    fn push_flow(&self, rule: &FlowRule) -> Result<(), ControllerError> {
        const CALL: &str = "POST /wm/staticflowpusher/json";
        let mut state = self.state.lock();
        state.calls.push(Call::Push(rule.name.clone()));
        state.nr_pushes += 1;
        if state.unreachable {
            return Err(Self::down(CALL));
        }
        if state.fail_push_at == Some(state.nr_pushes) {
            return Err(Self::rejected(CALL));
        }
        state.installed.insert(rule.name.clone(), rule.clone());
        if state.time_out_push_at == Some(state.nr_pushes) {
            return Err(ControllerError::Timeout {
                call: CALL.to_owned(),
            });
        }
        Ok(())
    }

    fn delete_flow(&self, name: &str) -> Result<(), ControllerError> {
        const CALL: &str = "DELETE /wm/staticflowpusher/json";
        let delay = self.state.lock().delete_delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let mut state = self.state.lock();
        state.calls.push(Call::Delete(name.to_owned()));
        if state.unreachable {
            return Err(Self::down(CALL));
        }
        if state.fail_delete_of.contains(name) {
            return Err(Self::rejected(CALL));
        }
        state.installed.remove(name);
        Ok(())
    }
}
