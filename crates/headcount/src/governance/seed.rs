//! JSON master-data seed for the API service and CLI: departments with their ceilings,
//! positions, and the employees already on staff.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    DepartmentId, DepartmentProfile, EmployeeAttributes, OrganizationId, Position, PositionId,
};
use super::memory::InMemoryMasterData;
use super::outcome::GovernanceError;
use super::storage::StoreError;
use super::HeadcountEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedDepartment {
    pub id: DepartmentId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub max_headcount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEmployee {
    pub department_id: DepartmentId,
    pub position_id: PositionId,
    #[serde(flatten)]
    pub attributes: EmployeeAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub departments: Vec<SeedDepartment>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub employees: Vec<SeedEmployee>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub departments: usize,
    pub positions: usize,
    pub employees: usize,
}

#[derive(Debug)]
pub enum SeedError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Duplicate(String),
    Rejected {
        entity: String,
        source: GovernanceError,
    },
}

impl fmt::Display for SeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedError::Io { path, source } => {
                write!(f, "failed to read seed file {}: {}", path.display(), source)
            }
            SeedError::Parse(err) => write!(f, "invalid seed JSON: {}", err),
            SeedError::Duplicate(id) => write!(f, "seed declares {} more than once", id),
            SeedError::Rejected { entity, source } => {
                write!(f, "seed entry {} rejected: {}", entity, source)
            }
        }
    }
}

impl std::error::Error for SeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SeedError::Io { source, .. } => Some(source),
            SeedError::Parse(err) => Some(err),
            SeedError::Duplicate(_) => None,
            SeedError::Rejected { source, .. } => Some(source),
        }
    }
}

impl From<serde_json::Error> for SeedError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl SeedData {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build the read-only lookups the engine validates against.
    pub fn master_data(&self) -> Result<InMemoryMasterData, SeedError> {
        let master = InMemoryMasterData::default();
        for department in &self.departments {
            master
                .register_department(DepartmentProfile {
                    id: department.id.clone(),
                    organization_id: department.organization_id.clone(),
                    name: department.name.clone(),
                })
                .map_err(|err| duplicate_or_rejected(err, format!("department {}", department.id)))?;
        }
        for position in &self.positions {
            master
                .register_position(position.clone())
                .map_err(|err| duplicate_or_rejected(err, format!("position {}", position.id)))?;
        }
        Ok(master)
    }

    /// Open a capacity ledger per department, then hire the listed staff as unplanned hires.
    /// An employee that does not fit under its department's ceiling rejects the whole seed.
    pub fn populate(&self, engine: &HeadcountEngine) -> Result<SeedSummary, SeedError> {
        for department in &self.departments {
            engine
                .quota()
                .open_department(&department.id, department.max_headcount)
                .map_err(|err| SeedError::Rejected {
                    entity: format!("department {}", department.id),
                    source: err.into(),
                })?;
        }

        for (index, employee) in self.employees.iter().enumerate() {
            engine
                .directory()
                .hire(
                    &employee.department_id,
                    &employee.position_id,
                    employee.attributes.clone(),
                    None,
                )
                .map_err(|source| SeedError::Rejected {
                    entity: format!("employee #{} ({})", index + 1, employee.attributes.first_name),
                    source,
                })?;
        }

        let summary = SeedSummary {
            departments: self.departments.len(),
            positions: self.positions.len(),
            employees: self.employees.len(),
        };
        info!(
            departments = summary.departments,
            positions = summary.positions,
            employees = summary.employees,
            "seed applied"
        );
        Ok(summary)
    }
}

fn duplicate_or_rejected(err: StoreError, entity: String) -> SeedError {
    match err {
        StoreError::Conflict(_) => SeedError::Duplicate(entity),
        other => SeedError::Rejected {
            entity,
            source: other.into(),
        },
    }
}
