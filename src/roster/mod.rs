//! Employee roster.
//!
//! Capture collaborators store enrolled faces here. The roster is passed
//! around explicitly; the capture session never reads or writes it.

mod memory;

pub use memory::InMemoryRoster;

use crate::encoding::CapturedImage;
use thiserror::Error;

/// Errors returned by roster operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("employee {0} already exists")]
    DuplicateId(String),
    #[error("employee {0} not found")]
    NotFound(String),
    #[error("employee id must not be empty")]
    EmptyId,
}

/// An enrolled employee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub email: String,
    pub position: String,
    pub department: String,
    /// Enrolled face photo.
    pub face_image: Option<CapturedImage>,
}

impl Employee {
    /// Creates an employee without a face photo.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        position: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            position: position.into(),
            department: department.into(),
            face_image: None,
        }
    }

    /// Attaches a face photo.
    pub fn with_face(mut self, image: CapturedImage) -> Self {
        self.face_image = Some(image);
        self
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct EmployeeUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub face_image: Option<CapturedImage>,
}

impl EmployeeUpdate {
    /// An update that only replaces the face photo.
    pub fn face(image: CapturedImage) -> Self {
        Self {
            face_image: Some(image),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, employee: &mut Employee) {
        if let Some(name) = self.name {
            employee.name = name;
        }
        if let Some(email) = self.email {
            employee.email = email;
        }
        if let Some(position) = self.position {
            employee.position = position;
        }
        if let Some(department) = self.department {
            employee.department = department;
        }
        if let Some(image) = self.face_image {
            employee.face_image = Some(image);
        }
    }
}

/// Storage for employees.
pub trait EmployeeRepository {
    /// Looks up an employee by id.
    fn get(&self, id: &str) -> Option<&Employee>;

    /// All employees in insertion order.
    fn list(&self) -> Vec<&Employee>;

    /// Adds a new employee. Ids must be unique and non-empty.
    fn add(&mut self, employee: Employee) -> Result<(), RosterError>;

    /// Applies a partial update to an existing employee.
    fn update(&mut self, id: &str, update: EmployeeUpdate) -> Result<(), RosterError>;

    /// Removes an employee and returns it.
    fn delete(&mut self, id: &str) -> Result<Employee, RosterError>;
}
