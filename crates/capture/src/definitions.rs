//! Run-scoped id namespace and definition store.

use std::collections::HashSet;

use contracts::{AnnotationDefinition, ContractError, MetricDefinition};
use tracing::{debug, instrument};

/// Issues unique ids and keeps registered definitions in registration order
///
/// Sensors, annotation definitions and metric definitions share one
/// namespace. A colliding id gets the first free `_N` suffix (`_0`, `_1`,
/// ...). Ids are never released within a run.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    ids: HashSet<String>,
    annotations: Vec<AnnotationDefinition>,
    metrics: Vec<MetricDefinition>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `requested`, or the first free suffixed variant of it
    pub fn reserve_id(&mut self, requested: &str) -> Result<String, ContractError> {
        if requested.is_empty() {
            return Err(ContractError::config_validation("id", "id cannot be empty"));
        }

        let id = if self.ids.contains(requested) {
            (0u64..)
                .map(|n| format!("{requested}_{n}"))
                .find(|candidate| !self.ids.contains(candidate))
                .ok_or_else(|| ContractError::Other(format!("id space exhausted for '{requested}'")))?
        } else {
            requested.to_string()
        };

        if id != requested {
            debug!(requested, assigned = %id, "Id collision, assigned suffixed id");
        }
        self.ids.insert(id.clone());
        Ok(id)
    }

    /// Register an annotation definition; the returned copy carries the final id
    #[instrument(name = "definition_registry_register_annotation", skip(self, definition), fields(requested = %definition.id))]
    pub fn register_annotation(
        &mut self,
        mut definition: AnnotationDefinition,
    ) -> Result<AnnotationDefinition, ContractError> {
        let id = self.reserve_id(&definition.id)?;
        let renamed = id != definition.id.as_str();
        definition.id = id.into();
        observability::record_definition_registered("annotation", renamed);
        self.annotations.push(definition.clone());
        Ok(definition)
    }

    /// Register a metric definition; the returned copy carries the final id
    #[instrument(name = "definition_registry_register_metric", skip(self, definition), fields(requested = %definition.id))]
    pub fn register_metric(
        &mut self,
        mut definition: MetricDefinition,
    ) -> Result<MetricDefinition, ContractError> {
        let id = self.reserve_id(&definition.id)?;
        let renamed = id != definition.id.as_str();
        definition.id = id.into();
        observability::record_definition_registered("metric", renamed);
        self.metrics.push(definition.clone());
        Ok(definition)
    }

    pub fn annotation(&self, id: &str) -> Result<&AnnotationDefinition, ContractError> {
        self.annotations
            .iter()
            .find(|definition| definition.id == id)
            .ok_or_else(|| ContractError::unknown_definition(id))
    }

    pub fn metric(&self, id: &str) -> Result<&MetricDefinition, ContractError> {
        self.metrics
            .iter()
            .find(|definition| definition.id == id)
            .ok_or_else(|| ContractError::unknown_definition(id))
    }

    /// Whether `id` is taken by anything in this run
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn annotations(&self) -> &[AnnotationDefinition] {
        &self.annotations
    }

    pub fn metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.annotations.clear();
        self.metrics.clear();
    }
}
