//! Connection requests, which name a student, a server and one of its services.

use crate::catalog::{Catalog, Server, Service, Student, StudentCode};
use crate::registry::Handler;

/// A request for access.
#[derive(
    Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder, serde::Serialize, serde::Deserialize,
)]
pub struct ConnectRequest {
    /// The requesting student.
    pub student: StudentCode,
    /// The target server, matched ignoring case.
    #[builder(setter(into))]
    pub server: String,
    /// The target service, matched ignoring case.
    #[builder(setter(into))]
    pub service: String,
}

impl ConnectRequest {
    /// Validate a request against a catalog snapshot, producing a `ValidRequest`.
    ///
    /// Correctness properties:
    ///
    /// - The student must be declared.
    /// - The server must be declared.
    /// - The server must offer the service.
    pub(crate) fn validate<'a>(
        &self,
        catalog: &'a Catalog,
    ) -> Result<ValidRequest<'a>, NotFoundError> {
        // CORRECTNESS: The student must be declared.
        let student = catalog
            .student(self.student)
            .ok_or(NotFoundError::Student(self.student))?;
        // CORRECTNESS: The server must be declared.
        let server = catalog
            .server(&self.server)
            .ok_or_else(|| NotFoundError::Server(self.server.clone()))?;
        // CORRECTNESS: The server must offer the service.
        let service = server
            .service(&self.service)
            .ok_or_else(|| NotFoundError::Service {
                server: server.name.clone(),
                service: self.service.clone(),
            })?;
        Ok(ValidRequest {
            student,
            server,
            service,
        })
    }
}

/// A `ConnectRequest` whose names have all been found in the catalog.
#[derive(Debug)]
pub(crate) struct ValidRequest<'a> {
    pub(crate) student: &'a Student,
    pub(crate) server: &'a Server,
    pub(crate) service: &'a Service,
}

/// Something a request names does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("unknown student {0}")]
    Student(StudentCode),

    #[error("unknown server {0:?}")]
    Server(String),

    #[error("server {server:?} does not offer {service:?}")]
    Service { server: String, service: String },

    #[error("no connection with handler {0}")]
    Handler(Handler),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn known_names_validate() {
        let catalog = testing::catalog();
        let req = ConnectRequest::builder()
            .student(testing::STUDENT)
            .server("SRV-SSH")
            .service("Ssh")
            .build();
        let valid = req.validate(&catalog).unwrap();
        assert_eq!(valid.student.code, testing::STUDENT);
        assert_eq!(valid.server.name, "srv-ssh");
        assert_eq!(valid.service.port, 22);
    }

    #[test]
    fn unknown_student_fails() {
        let catalog = testing::catalog();
        let req = ConnectRequest::builder()
            .student(StudentCode::new(1))
            .server("srv-ssh")
            .service("ssh")
            .build();
        assert_eq!(
            req.validate(&catalog).unwrap_err(),
            NotFoundError::Student(StudentCode::new(1))
        );
    }

    #[test]
    fn unknown_server_fails() {
        let catalog = testing::catalog();
        let req = ConnectRequest::builder()
            .student(testing::STUDENT)
            .server("srv-web")
            .service("http")
            .build();
        assert!(matches!(req.validate(&catalog), Err(NotFoundError::Server(_))));
    }

    #[test]
    fn unoffered_service_fails() {
        let catalog = testing::catalog();
        let req = ConnectRequest::builder()
            .student(testing::STUDENT)
            .server("srv-ssh")
            .service("http")
            .build();
        assert!(matches!(req.validate(&catalog), Err(NotFoundError::Service { .. })));
    }
}
