//! Runnable tasks and the task factory
//!
//! A [`TaskFactory`] only ever sees the limited storage client: building a
//! task must not be able to run catalog queries. Everything a task reads or
//! writes at run time flows through the [`ExecutionContext`].

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::storage::LimitedStorage;
use parking_lot::RwLock;
use quanta_core::{Quantum, QuantumSuccessCaveats, TaskDef};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What a task reports back when it returns without error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    pub caveats: QuantumSuccessCaveats,
}

impl TaskOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Expected terminal state with nothing to do.
    #[must_use]
    pub fn no_work() -> Self {
        Self::with_caveats(QuantumSuccessCaveats::NO_WORK_FOUND)
    }

    #[must_use]
    pub fn with_caveats(caveats: QuantumSuccessCaveats) -> Self {
        Self { caveats }
    }
}

/// A configured task, ready to run quanta
pub trait PipelineTask: Send + Sync {
    /// Run one quantum. Errors fail the attempt; they are never retried here.
    ///
    /// # Errors
    /// Any error the task raises, including [`ExecutionError`]s from the context.
    fn run_quantum(&self, context: &mut ExecutionContext, quantum: &Quantum) -> anyhow::Result<TaskOutcome>;

    /// Values for the task's declared init outputs, keyed by dataset type.
    fn init_output_values(&self) -> Vec<(String, Value)> {
        Vec::new()
    }
}

/// Builds runnable tasks from their definitions
pub trait TaskFactory: Send + Sync {
    /// # Errors
    /// [`ExecutionError::TaskConstruction`] if the definition cannot be built.
    fn make_task(&self, task: &TaskDef, client: Arc<dyn LimitedStorage>) -> Result<Box<dyn PipelineTask>, ExecutionError>;
}

type Constructor =
    Box<dyn Fn(&TaskDef, Arc<dyn LimitedStorage>) -> anyhow::Result<Box<dyn PipelineTask>> + Send + Sync>;

/// Factory dispatching on `TaskDef::task_class`
#[derive(Default)]
pub struct TaskRegistry {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes = self.task_classes();
        classes.sort();
        f.debug_struct("TaskRegistry").field("classes", &classes).finish()
    }
}

impl TaskRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `task_class`, replacing any previous one.
    pub fn register<F>(&self, task_class: impl Into<String>, constructor: F)
    where
        F: Fn(&TaskDef, Arc<dyn LimitedStorage>) -> anyhow::Result<Box<dyn PipelineTask>> + Send + Sync + 'static,
    {
        self.constructors.write().insert(task_class.into(), Box::new(constructor));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<F>(self, task_class: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&TaskDef, Arc<dyn LimitedStorage>) -> anyhow::Result<Box<dyn PipelineTask>> + Send + Sync + 'static,
    {
        self.register(task_class, constructor);
        self
    }

    #[must_use]
    pub fn contains(&self, task_class: &str) -> bool {
        self.constructors.read().contains_key(task_class)
    }

    #[must_use]
    pub fn task_classes(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }
}

impl TaskFactory for TaskRegistry {
    fn make_task(&self, task: &TaskDef, client: Arc<dyn LimitedStorage>) -> Result<Box<dyn PipelineTask>, ExecutionError> {
        let constructors = self.constructors.read();
        let constructor = constructors
            .get(&task.task_class)
            .ok_or_else(|| ExecutionError::TaskConstruction {
                task: task.label.clone(),
                reason: format!("unknown task class {}", task.task_class),
            })?;
        constructor(task, client).map_err(|e| {
            tracing::error!(task = %task.label, error = %e, "task construction failed");
            ExecutionError::TaskConstruction {
                task: task.label.clone(),
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use quanta_core::TaskConnections;

    struct Noop;

    impl PipelineTask for Noop {
        fn run_quantum(&self, _: &mut ExecutionContext, _: &Quantum) -> anyhow::Result<TaskOutcome> {
            Ok(TaskOutcome::no_work())
        }
    }

    fn def(class: &str, config: serde_json::Value) -> TaskDef {
        let connections = TaskConnections::builder(&[]).freeze().unwrap();
        TaskDef::new("t", class, connections).unwrap().with_config(config)
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::new().with("Noop", |task, _client| {
            if task.config.get("broken").is_some() {
                anyhow::bail!("config field broken is not supported");
            }
            Ok(Box::new(Noop) as Box<dyn PipelineTask>)
        })
    }

    #[test]
    fn registered_class_is_built() {
        let store: Arc<dyn LimitedStorage> = Arc::new(InMemoryStore::new());
        let reg = registry();
        assert!(reg.contains("Noop"));
        assert!(reg.make_task(&def("Noop", serde_json::json!({})), store).is_ok());
    }

    #[test]
    fn unknown_class_and_bad_config_fail_construction() {
        let store: Arc<dyn LimitedStorage> = Arc::new(InMemoryStore::new());
        let reg = registry();
        let err = reg.make_task(&def("Missing", serde_json::json!({})), store.clone()).err().unwrap();
        assert!(err.to_string().contains("unknown task class Missing"));

        let err = reg.make_task(&def("Noop", serde_json::json!({"broken": 1})), store).err().unwrap();
        assert!(matches!(err, ExecutionError::TaskConstruction { .. }));
    }

    #[test]
    fn outcome_helpers() {
        assert!(TaskOutcome::success().caveats.is_empty());
        assert_eq!(TaskOutcome::no_work().caveats, QuantumSuccessCaveats::NO_WORK_FOUND);
    }
}
