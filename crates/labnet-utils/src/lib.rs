//! Utilities for interfacing with labnet.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use labnet_core::catalog::{
    Catalog, CatalogError, Course, CourseStatus, Grant, Protocol, Server, Service, Student,
    StudentCode,
};
use labnet_core::{MacAddr, ValidationError};

/// Reads a [`Catalog`] from a file containing a [`CatalogDoc`] in YAML, JSON or Dhall format.
pub fn read_catalog(path: impl AsRef<Path>) -> Result<Catalog, Error> {
    read_catalog_doc(path)?.into_catalog()
}

/// Reads a [`CatalogDoc`] from a file in YAML, JSON or Dhall format.
pub fn read_catalog_doc(path: impl AsRef<Path>) -> Result<CatalogDoc, Error> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let doc: CatalogDoc = match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&contents)?,
        Some("json") => serde_json::from_str(&contents)?,
        Some("dhall") => serde_dhall::from_str(&contents).parse().map_err(Box::new)?,
        _ => return Err(Error::UnknownFileType(path.as_ref().into())),
    };
    Ok(doc)
}

/// Writes a [`Catalog`] to a file in YAML or JSON format.
pub fn write_catalog(path: impl AsRef<Path>, catalog: &Catalog) -> Result<(), Error> {
    let doc = CatalogDoc::from(catalog);
    let contents = match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::to_string(&doc)?,
        Some("json") => serde_json::to_string_pretty(&doc)?,
        _ => return Err(Error::UnknownFileType(path.as_ref().into())),
    };
    std::fs::write(path, contents)?;
    Ok(())
}

/// A catalog document: students, courses and servers as they are stored on disk.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct CatalogDoc {
    /// Students.
    #[serde(rename = "alumnos", default)]
    pub students: Vec<StudentDoc>,
    /// Courses.
    #[serde(rename = "cursos", default)]
    pub courses: Vec<CourseDoc>,
    /// Servers.
    #[serde(rename = "servidores", default)]
    pub servers: Vec<ServerDoc>,
}

/// A student record.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct StudentDoc {
    /// Full name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Student code.
    #[serde(rename = "codigo")]
    pub code: u64,
    /// MAC address of the student's host.
    pub mac: String,
}

/// A course record.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CourseDoc {
    /// Course code.
    #[serde(rename = "codigo")]
    pub code: String,
    /// Status, e.g. `DICTANDO`.
    #[serde(rename = "estado")]
    pub status: String,
    /// Course name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Codes of enrolled students.
    #[serde(rename = "alumnos", default)]
    pub roster: Vec<u64>,
    /// Server access granted to enrolled students.
    #[serde(rename = "servidores", default)]
    pub grants: Vec<GrantDoc>,
}

/// Access to some services on one server.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct GrantDoc {
    /// Server name.
    #[serde(rename = "nombre")]
    pub server: String,
    /// Names of the services granted.
    #[serde(rename = "servicios_permitidos", default)]
    pub services: Vec<String>,
}

/// A server record.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ServerDoc {
    /// Server name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// IPv4 address.
    pub ip: String,
    /// Services offered.
    #[serde(rename = "servicios", default)]
    pub services: Vec<ServiceDoc>,
}

/// A service record.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ServiceDoc {
    /// Service name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Transport protocol, e.g. `TCP`.
    #[serde(rename = "protocolo")]
    pub protocol: String,
    /// Port number.
    #[serde(rename = "puerto")]
    pub port: u16,
}

impl CatalogDoc {
    /// Converts the document to a validated [`Catalog`].
    pub fn into_catalog(self) -> Result<Catalog, Error> {
        let students = self
            .students
            .into_iter()
            .map(|s| -> Result<Student, Error> {
                let mac = s.mac.parse::<MacAddr>()?;
                Ok(Student::new(StudentCode::new(s.code), s.name, mac))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let servers = self
            .servers
            .into_iter()
            .map(|s| -> Result<Server, Error> {
                let ip = s
                    .ip
                    .trim()
                    .parse::<Ipv4Addr>()
                    .map_err(|_| ValidationError::InvalidIp(s.ip.clone()))?;
                let services = s
                    .services
                    .into_iter()
                    .map(|svc| {
                        // Protocol parsing is infallible; unknown names are kept as-is.
                        let protocol = svc
                            .protocol
                            .parse::<Protocol>()
                            .unwrap_or_else(|e| match e {});
                        Service::new(svc.name, protocol, svc.port)
                    })
                    .collect();
                Ok(Server::new(s.name, ip, services))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let courses = self
            .courses
            .into_iter()
            .map(|c| {
                Course::builder()
                    .code(c.code)
                    .status(c.status.parse::<CourseStatus>().unwrap_or_else(|e| match e {}))
                    .name(c.name)
                    .roster(c.roster.into_iter().map(StudentCode::new).collect())
                    .grants(
                        c.grants
                            .into_iter()
                            .map(|g| Grant::new(g.server, g.services))
                            .collect(),
                    )
                    .build()
            })
            .collect();
        Ok(Catalog::new(students, courses, servers)?)
    }
}

impl From<&Catalog> for CatalogDoc {
    fn from(catalog: &Catalog) -> Self {
        Self {
            students: catalog
                .students()
                .iter()
                .map(|s| StudentDoc {
                    name: s.name.clone(),
                    code: s.code.inner(),
                    mac: s.mac.to_string(),
                })
                .collect(),
            courses: catalog
                .courses()
                .iter()
                .map(|c| CourseDoc {
                    code: c.code.clone(),
                    status: c.status.to_string(),
                    name: c.name.clone(),
                    roster: c.roster.iter().map(|s| s.inner()).collect(),
                    grants: c
                        .grants
                        .iter()
                        .map(|g| GrantDoc {
                            server: g.server.clone(),
                            services: g.services().map(str::to_owned).collect(),
                        })
                        .collect(),
                })
                .collect(),
            servers: catalog
                .servers()
                .iter()
                .map(|s| ServerDoc {
                    name: s.name.clone(),
                    ip: s.ip.to_string(),
                    services: s
                        .services
                        .iter()
                        .map(|svc| ServiceDoc {
                            name: svc.name.clone(),
                            protocol: svc.protocol.to_string(),
                            port: svc.port,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Error kinds for catalog files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown file type.
    #[error("unknown file type: {0}")]
    UnknownFileType(PathBuf),

    /// Error serializing/deserializing YAML.
    #[error("YAML error")]
    Yaml(#[from] serde_yaml::Error),

    /// Error serializing/deserializing Dhall.
    #[error("Dhall error")]
    Dhall(#[from] Box<serde_dhall::Error>),

    /// Error serializing/deserializing JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// A malformed address.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Error constructing a consistent catalog.
    #[error("invalid catalog")]
    Catalog(#[from] CatalogError),
}
