//! Students, courses and servers. The catalog is owned by whoever loads it; the pipeline only
//! ever reads a snapshot of it.

pub mod types;

use std::collections::HashSet;

pub use types::*;

use crate::network::types::MacAddr;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    students: Vec<Student>,
    courses: Vec<Course>,
    servers: Vec<Server>,
}

impl Catalog {
    /// Creates a catalog. This function returns an error if the given records are inconsistent.
    ///
    /// Correctness properties:
    ///
    /// - Every student must have a unique code.
    /// - Every server must have a unique name, ignoring case.
    /// - Every service on a server must have a unique name, ignoring case.
    /// - Every course must have a unique code.
    /// - Every roster entry must be a declared student.
    /// - Every grant must name a declared server and services that server offers.
    pub fn new(
        students: Vec<Student>,
        courses: Vec<Course>,
        servers: Vec<Server>,
    ) -> Result<Self, CatalogError> {
        let mut codes = HashSet::new();
        for student in &students {
            // CORRECTNESS: Every student must have a unique code.
            if !codes.insert(student.code) {
                return Err(CatalogError::DuplicateStudent(student.code));
            }
        }
        let mut names = HashSet::new();
        for server in &servers {
            // CORRECTNESS: Every server must have a unique name, ignoring case.
            if !names.insert(server.name.to_ascii_lowercase()) {
                return Err(CatalogError::DuplicateServer(server.name.clone()));
            }
            // CORRECTNESS: Every service on a server must have a unique name, ignoring case.
            let mut services = HashSet::new();
            for service in &server.services {
                if !services.insert(service.name.to_ascii_lowercase()) {
                    return Err(CatalogError::DuplicateService {
                        server: server.name.clone(),
                        service: service.name.clone(),
                    });
                }
            }
        }
        let mut course_codes = HashSet::new();
        for course in &courses {
            // CORRECTNESS: Every course must have a unique code.
            if !course_codes.insert(course.code.clone()) {
                return Err(CatalogError::DuplicateCourse(course.code.clone()));
            }
            // CORRECTNESS: Every roster entry must be a declared student.
            if let Some(&student) = course.roster.iter().find(|s| !codes.contains(*s)) {
                return Err(CatalogError::UnknownStudent {
                    course: course.code.clone(),
                    student,
                });
            }
            // CORRECTNESS: Every grant must name a declared server and services it offers.
            for grant in &course.grants {
                let server = servers
                    .iter()
                    .find(|s| s.name.eq_ignore_ascii_case(&grant.server))
                    .ok_or_else(|| CatalogError::UnknownServer {
                        course: course.code.clone(),
                        server: grant.server.clone(),
                    })?;
                if let Some(service) = grant.services().find(|&s| server.service(s).is_none()) {
                    return Err(CatalogError::UnknownService {
                        course: course.code.clone(),
                        server: server.name.clone(),
                        service: service.to_owned(),
                    });
                }
            }
        }
        Ok(Self {
            students,
            courses,
            servers,
        })
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn student(&self, code: StudentCode) -> Option<&Student> {
        self.students.iter().find(|s| s.code == code)
    }

    /// Looks up a server by name, ignoring case.
    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn course(&self, code: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.code == code)
    }

    /// Adds a student. Codes must stay unique.
    pub fn add_student(&mut self, student: Student) -> Result<&Student, CatalogError> {
        if self.student(student.code).is_some() {
            return Err(CatalogError::DuplicateStudent(student.code));
        }
        self.students.push(student);
        Ok(&self.students[self.students.len() - 1])
    }

    /// Changes a student's name and/or MAC address.
    pub fn update_student(
        &mut self,
        code: StudentCode,
        name: Option<String>,
        mac: Option<MacAddr>,
    ) -> Result<&Student, CatalogError> {
        let student = self
            .students
            .iter_mut()
            .find(|s| s.code == code)
            .ok_or(CatalogError::NoSuchStudent(code))?;
        if let Some(name) = name {
            student.name = name;
        }
        if let Some(mac) = mac {
            student.mac = mac;
        }
        Ok(student)
    }

    /// Removes a student and takes them off every course roster.
    pub fn remove_student(&mut self, code: StudentCode) -> Result<Student, CatalogError> {
        let idx = self
            .students
            .iter()
            .position(|s| s.code == code)
            .ok_or(CatalogError::NoSuchStudent(code))?;
        for course in &mut self.courses {
            course.roster.remove(&code);
        }
        Ok(self.students.remove(idx))
    }

    pub fn enroll(&mut self, course: &str, student: StudentCode) -> Result<(), CatalogError> {
        if self.student(student).is_none() {
            return Err(CatalogError::NoSuchStudent(student));
        }
        let course = self.course_mut(course)?;
        if !course.roster.insert(student) {
            return Err(CatalogError::AlreadyEnrolled {
                course: course.code.clone(),
                student,
            });
        }
        Ok(())
    }

    pub fn unenroll(&mut self, course: &str, student: StudentCode) -> Result<(), CatalogError> {
        let course = self.course_mut(course)?;
        if !course.roster.remove(&student) {
            return Err(CatalogError::NotEnrolled {
                course: course.code.clone(),
                student,
            });
        }
        Ok(())
    }

    fn course_mut(&mut self, code: &str) -> Result<&mut Course, CatalogError> {
        self.courses
            .iter_mut()
            .find(|c| c.code == code)
            .ok_or_else(|| CatalogError::NoSuchCourse(code.to_owned()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate student code {0}")]
    DuplicateStudent(StudentCode),

    #[error("duplicate server name {0:?}")]
    DuplicateServer(String),

    #[error("server {server:?} lists service {service:?} twice")]
    DuplicateService { server: String, service: String },

    #[error("duplicate course code {0:?}")]
    DuplicateCourse(String),

    #[error("course {course:?} enrolls undeclared student {student}")]
    UnknownStudent { course: String, student: StudentCode },

    #[error("course {course:?} grants access to undeclared server {server:?}")]
    UnknownServer { course: String, server: String },

    #[error("course {course:?} grants service {service:?}, which {server:?} does not offer")]
    UnknownService {
        course: String,
        server: String,
        service: String,
    },

    #[error("no student with code {0}")]
    NoSuchStudent(StudentCode),

    #[error("no course with code {0:?}")]
    NoSuchCourse(String),

    #[error("student {student} is already enrolled in {course:?}")]
    AlreadyEnrolled { course: String, student: StudentCode },

    #[error("student {student} is not enrolled in {course:?}")]
    NotEnrolled { course: String, student: StudentCode },
}
