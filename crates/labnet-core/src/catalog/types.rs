use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::network::types::MacAddr;

identifier!(StudentCode, u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub code: StudentCode,
    pub name: String,
    pub mac: MacAddr,
}

impl Student {
    pub fn new(code: StudentCode, name: impl Into<String>, mac: MacAddr) -> Self {
        Self {
            code,
            name: name.into(),
            mac,
        }
    }
}

/// A transport protocol. Anything other than TCP or UDP is carried through so it can be listed,
/// but cannot be compiled into rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Other(String),
}

impl FromStr for Protocol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            _ => Protocol::Other(s.trim().to_owned()),
        })
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
}

impl Service {
    pub fn new(name: impl Into<String>, protocol: Protocol, port: u16) -> Self {
        Self {
            name: name.into(),
            protocol,
            port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub name: String,
    pub ip: Ipv4Addr,
    pub services: Vec<Service>,
}

impl Server {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, services: Vec<Service>) -> Self {
        Self {
            name: name.into(),
            ip,
            services,
        }
    }

    /// Looks up a service by name, ignoring case.
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CourseStatus {
    Scheduled,
    /// In session. Grants are only active in this state.
    Dictando,
    Closed,
    Other(String),
}

impl FromStr for CourseStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => CourseStatus::Scheduled,
            "DICTANDO" => CourseStatus::Dictando,
            "CLOSED" => CourseStatus::Closed,
            _ => CourseStatus::Other(s.trim().to_owned()),
        })
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourseStatus::Scheduled => f.write_str("SCHEDULED"),
            CourseStatus::Dictando => f.write_str("DICTANDO"),
            CourseStatus::Closed => f.write_str("CLOSED"),
            CourseStatus::Other(s) => f.write_str(s),
        }
    }
}

/// Access to a set of services on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub server: String,
    // Lowercased
    services: BTreeSet<String>,
}

impl Grant {
    pub fn new<I, S>(server: impl Into<String>, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            server: server.into(),
            services: services
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn covers(&self, server: &str, service: &str) -> bool {
        self.server.eq_ignore_ascii_case(server)
            && self.services.contains(&service.to_ascii_lowercase())
    }

    pub fn services(&self) -> impl Iterator<Item = &str> + '_ {
        self.services.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct Course {
    #[builder(setter(into))]
    pub code: String,
    pub status: CourseStatus,
    #[builder(setter(into))]
    pub name: String,
    #[builder(default)]
    pub roster: BTreeSet<StudentCode>,
    #[builder(default)]
    pub grants: Vec<Grant>,
}

impl Course {
    pub fn is_active(&self) -> bool {
        matches!(self.status, CourseStatus::Dictando)
    }

    pub fn enrolls(&self, student: StudentCode) -> bool {
        self.roster.contains(&student)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parsing_ignores_case() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!(" UDP ".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert_eq!(
            "icmp".parse::<Protocol>().unwrap(),
            Protocol::Other("icmp".into())
        );
    }

    #[test]
    fn status_parsing_ignores_case() {
        assert_eq!(
            "dictando".parse::<CourseStatus>().unwrap(),
            CourseStatus::Dictando
        );
        assert_eq!(
            "ARCHIVED".parse::<CourseStatus>().unwrap(),
            CourseStatus::Other("ARCHIVED".into())
        );
    }

    #[test]
    fn grant_matches_ignore_case() {
        let grant = Grant::new("srv-SSH", ["SSH", "Web"]);
        assert!(grant.covers("SRV-ssh", "ssh"));
        assert!(grant.covers("srv-ssh", "WEB"));
        assert!(!grant.covers("srv-ssh", "ftp"));
        assert!(!grant.covers("srv-web", "ssh"));
    }

    #[test]
    fn service_lookup_ignores_case() {
        let server = Server::new(
            "srv",
            Ipv4Addr::new(10, 0, 0, 3),
            vec![Service::new("SSH", Protocol::Tcp, 22)],
        );
        assert_eq!(server.service("ssh").map(|s| s.port), Some(22));
        assert!(server.service("ftp").is_none());
    }
}
