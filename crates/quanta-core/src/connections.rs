//! Task connections and task definitions
//!
//! Connections are declared through [`TaskConnectionsBuilder`], which allows
//! adding, removing and replacing declarations while a task is being
//! configured. [`TaskConnectionsBuilder::freeze`] validates the declarations
//! and returns an immutable [`TaskConnections`]; nothing can change after
//! that point.
//!
//! ```rust,ignore
//! let connections = TaskConnections::builder(&["instrument", "visit"])
//!     .with_connection(Connection::input("raw", raw_type))
//!     .with_connection(Connection::prerequisite("refcat", refcat_type).multiple())
//!     .with_connection(Connection::output("calexp", calexp_type))
//!     .freeze()?;
//! let def = TaskDef::new("calibrate", "CalibrateTask", connections)?;
//! ```

use crate::dataset::DatasetType;
use crate::error::ConnectionError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Regular per-quantum input; drives quantum generation
    Input,
    /// Input looked up by constraint rather than produced in the graph
    PrerequisiteInput,
    /// Per-quantum output
    Output,
    /// Dimensionless input read once at task construction
    InitInput,
    /// Dimensionless output written once per graph
    InitOutput,
}

impl ConnectionKind {
    #[inline]
    #[must_use]
    pub const fn is_init(self) -> bool {
        matches!(self, Self::InitInput | Self::InitOutput)
    }
}

/// How many datasets a connection resolves to per quantum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    /// Exactly one dataset
    #[default]
    Single,
    /// Zero or more datasets
    Multiple,
}

/// One declared connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub name: String,
    pub dataset_type: DatasetType,
    pub kind: ConnectionKind,
    pub multiplicity: Multiplicity,
}

impl Connection {
    #[must_use]
    pub fn new(name: impl Into<String>, dataset_type: DatasetType, kind: ConnectionKind) -> Self {
        Self {
            name: name.into(),
            dataset_type,
            kind,
            multiplicity: Multiplicity::Single,
        }
    }

    #[must_use]
    pub fn input(name: impl Into<String>, dataset_type: DatasetType) -> Self {
        Self::new(name, dataset_type, ConnectionKind::Input)
    }

    /// Prerequisites default to [`Multiplicity::Multiple`]: zero matches is allowed.
    #[must_use]
    pub fn prerequisite(name: impl Into<String>, dataset_type: DatasetType) -> Self {
        Self::new(name, dataset_type, ConnectionKind::PrerequisiteInput).multiple()
    }

    #[must_use]
    pub fn output(name: impl Into<String>, dataset_type: DatasetType) -> Self {
        Self::new(name, dataset_type, ConnectionKind::Output)
    }

    #[must_use]
    pub fn init_input(name: impl Into<String>, dataset_type: DatasetType) -> Self {
        Self::new(name, dataset_type, ConnectionKind::InitInput)
    }

    #[must_use]
    pub fn init_output(name: impl Into<String>, dataset_type: DatasetType) -> Self {
        Self::new(name, dataset_type, ConnectionKind::InitOutput)
    }

    #[inline]
    #[must_use]
    pub fn multiple(mut self) -> Self {
        self.multiplicity = Multiplicity::Multiple;
        self
    }

    #[inline]
    #[must_use]
    pub fn single(mut self) -> Self {
        self.multiplicity = Multiplicity::Single;
        self
    }
}

/// Mutable connection declarations for one task
#[derive(Debug, Clone, Default)]
pub struct TaskConnectionsBuilder {
    dimensions: BTreeSet<String>,
    connections: IndexMap<String, Connection>,
    deferred: Option<ConnectionError>,
}

impl TaskConnectionsBuilder {
    #[must_use]
    pub fn new(dimensions: &[&str]) -> Self {
        Self {
            dimensions: dimensions.iter().map(|d| (*d).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Replace the task dimensions
    pub fn set_dimensions(&mut self, dimensions: &[&str]) -> &mut Self {
        self.dimensions = dimensions.iter().map(|d| (*d).to_string()).collect();
        self
    }

    /// Declare a new connection
    ///
    /// # Errors
    /// [`ConnectionError::DuplicateName`] if the name is already declared.
    pub fn add(&mut self, connection: Connection) -> Result<&mut Self, ConnectionError> {
        if self.connections.contains_key(&connection.name) {
            return Err(ConnectionError::DuplicateName(connection.name));
        }
        self.connections.insert(connection.name.clone(), connection);
        Ok(self)
    }

    /// Remove a declared connection
    ///
    /// # Errors
    /// [`ConnectionError::UnknownName`] if nothing is declared under `name`.
    pub fn remove(&mut self, name: &str) -> Result<Connection, ConnectionError> {
        self.connections
            .shift_remove(name)
            .ok_or_else(|| ConnectionError::UnknownName(name.to_string()))
    }

    /// Replace a declared connection in place, keeping declaration order
    ///
    /// # Errors
    /// [`ConnectionError::UnknownName`] if nothing is declared under the name.
    pub fn replace(&mut self, connection: Connection) -> Result<Connection, ConnectionError> {
        let slot = self
            .connections
            .get_mut(&connection.name)
            .ok_or_else(|| ConnectionError::UnknownName(connection.name.clone()))?;
        Ok(std::mem::replace(slot, connection))
    }

    /// Chaining form of [`add`](Self::add); errors surface at [`freeze`](Self::freeze).
    #[must_use]
    pub fn with_connection(mut self, connection: Connection) -> Self {
        let added = self.add(connection).map(|_| ());
        if let Err(e) = added {
            self.deferred.get_or_insert(e);
        }
        self
    }

    /// Validate and freeze.
    ///
    /// # Errors
    /// Fails on any deferred declaration error, init connections with
    /// dimensions, or outputs with dimensions outside the task dimensions.
    pub fn freeze(self) -> Result<TaskConnections, ConnectionError> {
        if let Some(e) = self.deferred {
            return Err(e);
        }
        for c in self.connections.values() {
            if c.kind.is_init() && !c.dataset_type.is_global() {
                return Err(ConnectionError::InitConnectionHasDimensions {
                    name: c.name.clone(),
                });
            }
            if c.kind == ConnectionKind::Output {
                if let Some(d) = c
                    .dataset_type
                    .dimensions
                    .iter()
                    .find(|d| !self.dimensions.contains(*d))
                {
                    return Err(ConnectionError::OutputDimensionOutsideTask {
                        name: c.name.clone(),
                        dimension: d.clone(),
                    });
                }
            }
        }
        Ok(TaskConnections {
            dimensions: self.dimensions,
            connections: self.connections,
        })
    }
}

/// Frozen connection declarations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskConnections {
    dimensions: BTreeSet<String>,
    connections: IndexMap<String, Connection>,
}

impl TaskConnections {
    #[inline]
    #[must_use]
    pub fn builder(dimensions: &[&str]) -> TaskConnectionsBuilder {
        TaskConnectionsBuilder::new(dimensions)
    }

    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> &BTreeSet<String> {
        &self.dimensions
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name)
    }

    /// All connections in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn of_kind(&self, kind: ConnectionKind) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(move |c| c.kind == kind)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Connection> {
        self.of_kind(ConnectionKind::Input)
    }

    pub fn prerequisites(&self) -> impl Iterator<Item = &Connection> {
        self.of_kind(ConnectionKind::PrerequisiteInput)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Connection> {
        self.of_kind(ConnectionKind::Output)
    }

    pub fn init_inputs(&self) -> impl Iterator<Item = &Connection> {
        self.of_kind(ConnectionKind::InitInput)
    }

    pub fn init_outputs(&self) -> impl Iterator<Item = &Connection> {
        self.of_kind(ConnectionKind::InitOutput)
    }

    /// Editable copy, for deriving a variant of an existing task.
    #[must_use]
    pub fn to_builder(&self) -> TaskConnectionsBuilder {
        TaskConnectionsBuilder {
            dimensions: self.dimensions.clone(),
            connections: self.connections.clone(),
            deferred: None,
        }
    }
}

/// A configured task: label, implementation class, connections and config
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDef {
    pub label: String,
    pub task_class: String,
    pub connections: TaskConnections,
    pub config: serde_json::Value,
}

impl TaskDef {
    /// # Errors
    /// [`ConnectionError::EmptyLabel`] for an empty label.
    pub fn new(
        label: impl Into<String>,
        task_class: impl Into<String>,
        connections: TaskConnections,
    ) -> Result<Self, ConnectionError> {
        let label = label.into();
        if label.is_empty() {
            return Err(ConnectionError::EmptyLabel);
        }
        Ok(Self {
            label,
            task_class: task_class.into(),
            connections,
            config: serde_json::Value::Object(serde_json::Map::new()),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> &BTreeSet<String> {
        self.connections.dimensions()
    }

    /// Per-quantum metadata output carrying the task metadata slot.
    #[must_use]
    pub fn metadata_dataset_type(&self) -> DatasetType {
        let dims: Vec<&str> = self.dimensions().iter().map(String::as_str).collect();
        DatasetType::new(format!("{}_metadata", self.label), &dims, "TaskMetadata")
    }

    /// Graph-global dataset recording the task configuration.
    #[must_use]
    pub fn config_dataset_type(&self) -> DatasetType {
        DatasetType::global(format!("{}_config", self.label), "Config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> DatasetType {
        DatasetType::new("raw", &["instrument", "visit", "detector"], "Exposure")
    }

    fn calexp() -> DatasetType {
        DatasetType::new("calexp", &["instrument", "visit", "detector"], "Exposure")
    }

    #[test]
    fn freeze_keeps_declaration_order() {
        let c = TaskConnections::builder(&["instrument", "visit", "detector"])
            .with_connection(Connection::output("calexp", calexp()))
            .with_connection(Connection::input("raw", raw()))
            .freeze()
            .unwrap();
        let names: Vec<_> = c.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["calexp", "raw"]);
        assert_eq!(c.inputs().count(), 1);
        assert_eq!(c.outputs().count(), 1);
    }

    #[test]
    fn duplicate_name_surfaces_at_freeze() {
        let err = TaskConnections::builder(&[])
            .with_connection(Connection::input("in", DatasetType::global("a", "Dict")))
            .with_connection(Connection::input("in", DatasetType::global("b", "Dict")))
            .freeze()
            .unwrap_err();
        assert_eq!(err, ConnectionError::DuplicateName("in".into()));
    }

    #[test]
    fn replace_and_remove() {
        let mut b = TaskConnectionsBuilder::new(&["instrument", "visit", "detector"]);
        b.add(Connection::input("raw", raw())).unwrap();
        b.add(Connection::output("calexp", calexp())).unwrap();

        let old = b.replace(Connection::input("raw", raw()).multiple()).unwrap();
        assert_eq!(old.multiplicity, Multiplicity::Single);

        b.remove("calexp").unwrap();
        assert!(matches!(b.remove("calexp"), Err(ConnectionError::UnknownName(_))));

        let frozen = b.freeze().unwrap();
        assert_eq!(frozen.get("raw").unwrap().multiplicity, Multiplicity::Multiple);
        assert!(frozen.get("calexp").is_none());
    }

    #[test]
    fn init_connections_must_be_global() {
        let err = TaskConnections::builder(&["instrument"])
            .with_connection(Connection::init_output("schema", DatasetType::new("schema", &["instrument"], "Schema")))
            .freeze()
            .unwrap_err();
        assert!(matches!(err, ConnectionError::InitConnectionHasDimensions { .. }));
    }

    #[test]
    fn outputs_must_fit_task_dimensions() {
        let err = TaskConnections::builder(&["instrument", "visit"])
            .with_connection(Connection::output("calexp", calexp()))
            .freeze()
            .unwrap_err();
        assert_eq!(
            err,
            ConnectionError::OutputDimensionOutsideTask {
                name: "calexp".into(),
                dimension: "detector".into()
            }
        );
    }

    #[test]
    fn task_def_derived_dataset_types() {
        let c = TaskConnections::builder(&["instrument", "visit"]).freeze().unwrap();
        let def = TaskDef::new("isr", "IsrTask", c).unwrap();
        assert_eq!(def.metadata_dataset_type().name, "isr_metadata");
        assert_eq!(def.metadata_dataset_type().dimensions.len(), 2);
        assert!(def.config_dataset_type().is_global());
        assert!(TaskDef::new("", "X", def.connections.clone()).is_err());
    }
}
