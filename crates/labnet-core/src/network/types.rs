use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

identifier!(PortNo, u32);

/// An opaque switch identifier (a datapath ID as reported by the controller).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct SwitchId(String);

impl SwitchId {
    pub fn new(dpid: impl Into<String>) -> Self {
        Self(dpid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An Ethernet MAC address. Displayed in lowercase, colon-separated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Compares against a controller-reported address, ignoring case and separator style.
    pub fn matches(&self, reported: &str) -> bool {
        reported.parse::<MacAddr>().is_ok_and(|mac| mac == *self)
    }
}

impl FromStr for MacAddr {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidMac(s.to_owned());
        let sep = if s.contains('-') { '-' } else { ':' };
        let mut octets = [0; 6];
        let mut parts = s.trim().split(sep);
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// The switch and port where a host is attached to the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_new::new, serde::Serialize)]
pub struct AttachmentPoint {
    pub switch: SwitchId,
    pub port: PortNo,
}

impl fmt::Display for AttachmentPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.switch, self.port)
    }
}

/// One step of a path: the port a packet uses at a switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_new::new, serde::Serialize)]
pub struct RouteHop {
    pub switch: SwitchId,
    pub port: PortNo,
}

/// A host as the pipeline looks it up in the device inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Endpoint {
    #[display(fmt = "MAC {}", _0)]
    Mac(MacAddr),
    #[display(fmt = "IP {}", _0)]
    Ip(Ipv4Addr),
}

/// A malformed identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Not six hex octets.
    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),

    /// Not a dotted-quad IPv4 address.
    #[error("invalid IPv4 address {0:?}")]
    InvalidIp(String),

    /// Empty, or contains characters other than ASCII letters, digits and `-`.
    #[error("invalid connection handler {0:?}")]
    InvalidHandler(String),
}
