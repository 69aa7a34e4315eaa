//! In-memory roster.

use super::{Employee, EmployeeRepository, EmployeeUpdate, RosterError};

/// Roster kept in a vector, preserving insertion order.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRoster {
    employees: Vec<Employee>,
}

impl InMemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of employees.
    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    fn position(&self, id: &str) -> Result<usize, RosterError> {
        self.employees
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))
    }
}

impl EmployeeRepository for InMemoryRoster {
    fn get(&self, id: &str) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

    fn list(&self) -> Vec<&Employee> {
        self.employees.iter().collect()
    }

    fn add(&mut self, employee: Employee) -> Result<(), RosterError> {
        if employee.id.is_empty() {
            return Err(RosterError::EmptyId);
        }
        if self.get(&employee.id).is_some() {
            return Err(RosterError::DuplicateId(employee.id));
        }
        tracing::info!(id = %employee.id, name = %employee.name, "Employee added");
        self.employees.push(employee);
        Ok(())
    }

    fn update(&mut self, id: &str, update: EmployeeUpdate) -> Result<(), RosterError> {
        let index = self.position(id)?;
        update.apply(&mut self.employees[index]);
        tracing::info!(id, "Employee updated");
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<Employee, RosterError> {
        let index = self.position(id)?;
        tracing::info!(id, "Employee deleted");
        Ok(self.employees.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{CapturedImage, EncodingFormat};

    fn employee(id: &str, name: &str) -> Employee {
        Employee::new(id, name, format!("{id}@example.com"), "Developer", "Engineering")
    }

    #[test]
    fn test_add_and_list_in_order() {
        let mut roster = InMemoryRoster::new();
        roster.add(employee("2", "John Doe")).unwrap();
        roster.add(employee("3", "Sarah Johnson")).unwrap();

        let ids: Vec<&str> = roster.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["2", "3"]);
        assert_eq!(roster.get("3").unwrap().name, "Sarah Johnson");
    }

    #[test]
    fn test_duplicate_and_empty_ids_rejected() {
        let mut roster = InMemoryRoster::new();
        roster.add(employee("2", "John Doe")).unwrap();

        assert_eq!(
            roster.add(employee("2", "Someone Else")),
            Err(RosterError::DuplicateId("2".into()))
        );
        assert_eq!(roster.add(employee("", "Nobody")), Err(RosterError::EmptyId));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut roster = InMemoryRoster::new();
        roster.add(employee("4", "Michael Wilson")).unwrap();

        let face = CapturedImage::new(vec![1, 2, 3], EncodingFormat::Png, 1, 1);
        roster
            .update(
                "4",
                EmployeeUpdate {
                    position: Some("Project Manager".into()),
                    ..EmployeeUpdate::face(face.clone())
                },
            )
            .unwrap();

        let updated = roster.get("4").unwrap();
        assert_eq!(updated.position, "Project Manager");
        assert_eq!(updated.name, "Michael Wilson");
        assert_eq!(updated.face_image.as_ref(), Some(&face));
    }

    #[test]
    fn test_delete() {
        let mut roster = InMemoryRoster::new();
        roster.add(employee("5", "Emily Davis")).unwrap();

        let removed = roster.delete("5").unwrap();
        assert_eq!(removed.id, "5");
        assert!(roster.is_empty());
        assert_eq!(roster.delete("5"), Err(RosterError::NotFound("5".into())));
        assert!(matches!(
            roster.update("5", EmployeeUpdate::default()),
            Err(RosterError::NotFound(_))
        ));
    }
}
