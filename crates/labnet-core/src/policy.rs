//! Decides whether a student may reach a service on a server.

use crate::catalog::types::{Course, StudentCode};

/// Returns true if some course in session enrolls `student` and grants `service` on `server`.
/// Server and service names are compared ignoring case.
pub fn authorize(student: StudentCode, server: &str, service: &str, courses: &[Course]) -> bool {
    authorizing_course(student, server, service, courses).is_some()
}

/// Returns the first course that grants the access, if any.
pub fn authorizing_course<'a>(
    student: StudentCode,
    server: &str,
    service: &str,
    courses: &'a [Course],
) -> Option<&'a Course> {
    courses
        .iter()
        .filter(|c| c.is_active() && c.enrolls(student))
        .find(|c| c.grants.iter().any(|g| g.covers(server, service)))
}
