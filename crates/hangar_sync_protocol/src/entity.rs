//! Entity types and mutation operations.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of record a mutation targets.
///
/// The set is open: payloads are opaque to the sync engine, so any entity
/// kind the application invents can be queued as [`EntityType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    /// An aircraft in the fleet.
    Aircraft,
    /// A staff member.
    Employee,
    /// A maintenance or operations task.
    Task,
    /// A flight sheet (technical log page).
    FlightSheet,
    /// Any other application-defined entity.
    Other(String),
}

impl EntityType {
    /// Returns the canonical singular name.
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Aircraft => "aircraft",
            EntityType::Employee => "employee",
            EntityType::Task => "task",
            EntityType::FlightSheet => "flight_sheet",
            EntityType::Other(name) => name,
        }
    }

    /// Returns the name of the local table holding records of this type.
    pub fn table_name(&self) -> &str {
        match self {
            EntityType::Aircraft => "aircraft",
            EntityType::Employee => "employees",
            EntityType::Task => "tasks",
            EntityType::FlightSheet => "flight_sheets",
            EntityType::Other(name) => name,
        }
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "aircraft" => EntityType::Aircraft,
            "employee" | "employees" => EntityType::Employee,
            "task" | "tasks" => EntityType::Task,
            "flight_sheet" | "flight_sheets" | "flightsheet" | "flightsheets" => {
                EntityType::FlightSheet
            }
            _ => EntityType::Other(name.trim().to_string()),
        }
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        EntityType::from(name.as_str())
    }
}

impl From<EntityType> for String {
    fn from(entity: EntityType) -> Self {
        match entity {
            EntityType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation applied to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// The entity was created locally.
    Create,
    /// The entity was modified locally.
    Update,
    /// The entity was deleted locally.
    Delete,
}

impl Operation {
    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Returns true if the operation carries a record snapshot.
    pub fn carries_payload(&self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "insert" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" | "remove" => Ok(Operation::Delete),
            _ => Err(ProtocolError::Parse {
                what: "operation",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_entity_names() {
        assert_eq!(EntityType::from("aircraft"), EntityType::Aircraft);
        assert_eq!(EntityType::from("Employees"), EntityType::Employee);
        assert_eq!(EntityType::from("flight-sheet"), EntityType::FlightSheet);
        assert_eq!(EntityType::from("flightSheets"), EntityType::FlightSheet);
        assert_eq!(
            EntityType::from("spare_part"),
            EntityType::Other("spare_part".into())
        );
    }

    #[test]
    fn table_names() {
        assert_eq!(EntityType::Aircraft.table_name(), "aircraft");
        assert_eq!(EntityType::Employee.table_name(), "employees");
        assert_eq!(EntityType::FlightSheet.table_name(), "flight_sheets");
        assert_eq!(EntityType::Other("parts".into()).table_name(), "parts");
    }

    #[test]
    fn entity_serializes_as_string() {
        let json = serde_json::to_string(&EntityType::FlightSheet).unwrap();
        assert_eq!(json, "\"flight_sheet\"");

        let parsed: EntityType = serde_json::from_str("\"tooling\"").unwrap();
        assert_eq!(parsed, EntityType::Other("tooling".into()));
    }

    #[test]
    fn operation_parse() {
        assert_eq!("Create".parse::<Operation>().unwrap(), Operation::Create);
        assert_eq!("delete".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("upsert".parse::<Operation>().is_err());
        assert!(!Operation::Delete.carries_payload());
        assert!(Operation::Update.carries_payload());
    }
}
