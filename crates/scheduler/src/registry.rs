//! Registered egos and sensors of one simulation run.

use contracts::{
    CaptureTriggerMode, ContractError, EgoHandle, EgoId, RunId, SensorDefinition, SensorHandle,
    SensorId,
};
use tracing::{debug, instrument};

use crate::cadence::Cadence;

/// A registered ego
#[derive(Debug, Clone, PartialEq)]
pub struct EgoRecord {
    pub id: EgoId,
    pub description: String,
}

/// A registered sensor with its mutable scheduling state
#[derive(Debug, Clone)]
pub struct SensorState {
    definition: SensorDefinition,
    enabled: bool,
    pub(crate) cadence: Cadence,
}

impl SensorState {
    pub fn definition(&self) -> &SensorDefinition {
        &self.definition
    }

    pub fn id(&self) -> &SensorId {
        &self.definition.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Render slots consumed so far in the current sequence
    pub fn renders_issued(&self) -> u64 {
        self.cadence.renders_issued()
    }
}

/// Egos and sensors registered in the current run
///
/// Handles carry the [`RunId`] they were issued under; once the registry is
/// cleared for a new run they no longer resolve.
#[derive(Debug)]
pub struct SensorRegistry {
    run: RunId,
    egos: Vec<EgoRecord>,
    sensors: Vec<SensorState>,
    /// Ego ids live in their own namespace, apart from definition ids
    next_ego: u64,
}

impl SensorRegistry {
    pub fn new(run: RunId) -> Self {
        Self {
            run,
            egos: Vec::new(),
            sensors: Vec::new(),
            next_ego: 0,
        }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Register an ego under an already-reserved id
    #[instrument(name = "sensor_registry_register_ego", skip(self, description), fields(ego_id = %id))]
    pub fn register_ego(
        &mut self,
        id: EgoId,
        description: impl Into<String>,
    ) -> Result<EgoHandle, ContractError> {
        if self.egos.iter().any(|ego| ego.id == id) {
            return Err(ContractError::config_validation(
                format!("egos[id={id}]"),
                "duplicate ego id",
            ));
        }
        self.egos.push(EgoRecord {
            id: id.clone(),
            description: description.into(),
        });
        debug!(ego_id = %id, run = %self.run, "Ego registered");
        Ok(EgoHandle::new(id, self.run))
    }

    /// Register an ego under the next free `ego_N` id
    pub fn allocate_ego(
        &mut self,
        description: impl Into<String>,
    ) -> Result<EgoHandle, ContractError> {
        let id = loop {
            let candidate: EgoId = format!("ego_{}", self.next_ego).into();
            self.next_ego += 1;
            if !self.egos.iter().any(|ego| ego.id == candidate) {
                break candidate;
            }
        };
        self.register_ego(id, description)
    }

    /// Register a sensor under `ego`
    ///
    /// # Errors
    /// - stale or unknown ego handle
    /// - duplicate sensor id
    /// - cadence out of range (see [`validate_cadence`])
    #[instrument(
        name = "sensor_registry_register_sensor",
        skip(self, ego, definition),
        fields(sensor_id = %definition.id, ego_id = %ego.id())
    )]
    pub fn register_sensor(
        &mut self,
        ego: &EgoHandle,
        mut definition: SensorDefinition,
    ) -> Result<SensorHandle, ContractError> {
        self.ego(ego)?;
        validate_cadence(&definition)?;
        if self.position(&definition.id).is_some() {
            return Err(ContractError::config_validation(
                format!("sensors[id={}]", definition.id),
                "duplicate sensor id",
            ));
        }

        definition.ego_id = ego.id().clone();
        let handle = SensorHandle::new(definition.id.clone(), ego.id().clone(), self.run);
        debug!(
            sensor_id = %definition.id,
            modality = %definition.modality,
            period = definition.period,
            first_capture_time = definition.first_capture_time,
            trigger_mode = ?definition.trigger_mode,
            "Sensor registered"
        );
        self.sensors.push(SensorState {
            definition,
            enabled: true,
            cadence: Cadence::default(),
        });
        Ok(handle)
    }

    pub fn ego(&self, handle: &EgoHandle) -> Result<&EgoRecord, ContractError> {
        if handle.run() != self.run {
            return Err(stale(handle.id(), handle.run(), self.run));
        }
        self.egos
            .iter()
            .find(|ego| ego.id == *handle.id())
            .ok_or_else(|| ContractError::invalid_handle(handle.id().as_str(), "ego is not registered"))
    }

    pub fn sensor(&self, handle: &SensorHandle) -> Result<&SensorState, ContractError> {
        let index = self.resolve(handle)?;
        Ok(&self.sensors[index])
    }

    pub(crate) fn sensor_mut(
        &mut self,
        handle: &SensorHandle,
    ) -> Result<&mut SensorState, ContractError> {
        let index = self.resolve(handle)?;
        Ok(&mut self.sensors[index])
    }

    pub fn is_valid_ego(&self, handle: &EgoHandle) -> bool {
        self.ego(handle).is_ok()
    }

    pub fn is_valid_sensor(&self, handle: &SensorHandle) -> bool {
        self.resolve(handle).is_ok()
    }

    pub fn set_enabled(&mut self, handle: &SensorHandle, enabled: bool) -> Result<(), ContractError> {
        let state = self.sensor_mut(handle)?;
        if state.enabled != enabled {
            debug!(sensor_id = %handle.id(), enabled, "Sensor enabled state changed");
        }
        state.enabled = enabled;
        Ok(())
    }

    pub fn is_enabled(&self, handle: &SensorHandle) -> Result<bool, ContractError> {
        Ok(self.sensor(handle)?.enabled)
    }

    /// Remove one sensor; its handle stops validating
    pub fn unregister_sensor(
        &mut self,
        handle: &SensorHandle,
    ) -> Result<SensorDefinition, ContractError> {
        let index = self.resolve(handle)?;
        let state = self.sensors.remove(index);
        debug!(sensor_id = %handle.id(), "Sensor unregistered");
        Ok(state.definition)
    }

    /// Remove an ego together with every sensor mounted on it
    pub fn unregister_ego(
        &mut self,
        handle: &EgoHandle,
    ) -> Result<Vec<SensorDefinition>, ContractError> {
        self.ego(handle)?;
        self.egos.retain(|ego| ego.id != *handle.id());

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.sensors)
            .into_iter()
            .partition(|state| state.definition.ego_id == *handle.id());
        self.sensors = kept;
        debug!(ego_id = %handle.id(), sensors = removed.len(), "Ego unregistered");
        Ok(removed.into_iter().map(|state| state.definition).collect())
    }

    /// Drop everything and start issuing handles for `next_run`
    pub fn clear(&mut self, next_run: RunId) {
        self.egos.clear();
        self.sensors.clear();
        self.next_ego = 0;
        self.run = next_run;
    }

    pub fn egos(&self) -> impl Iterator<Item = &EgoRecord> {
        self.egos.iter()
    }

    /// Sensors in registration order
    pub fn sensors(&self) -> impl Iterator<Item = &SensorState> {
        self.sensors.iter()
    }

    pub fn sensor_by_id(&self, id: &str) -> Option<&SensorState> {
        self.sensors.iter().find(|state| state.definition.id == id)
    }

    pub(crate) fn states_mut(&mut self) -> impl Iterator<Item = &mut SensorState> {
        self.sensors.iter_mut()
    }

    pub fn ego_count(&self) -> usize {
        self.egos.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    fn position(&self, id: &SensorId) -> Option<usize> {
        self.sensors.iter().position(|state| state.definition.id == *id)
    }

    fn resolve(&self, handle: &SensorHandle) -> Result<usize, ContractError> {
        if handle.run() != self.run {
            return Err(stale(handle.id(), handle.run(), self.run));
        }
        self.position(handle.id()).ok_or_else(|| {
            ContractError::invalid_handle(handle.id().as_str(), "sensor is not registered")
        })
    }
}

/// Check a sensor's cadence fields
pub fn validate_cadence(definition: &SensorDefinition) -> Result<(), ContractError> {
    let field = |name: &str| format!("sensors[{}].{name}", definition.id);

    if !definition.first_capture_time.is_finite() || definition.first_capture_time < 0.0 {
        return Err(ContractError::config_validation(
            field("first_capture_time"),
            format!(
                "first_capture_time must be finite and >= 0, got {}",
                definition.first_capture_time
            ),
        ));
    }

    let needs_period = match definition.trigger_mode {
        CaptureTriggerMode::Scheduled => true,
        CaptureTriggerMode::Manual => definition.manual_affects_timing,
    };
    if needs_period && !(definition.period.is_finite() && definition.period > 0.0) {
        return Err(ContractError::config_validation(
            field("period"),
            format!("period must be > 0, got {}", definition.period),
        ));
    }
    Ok(())
}

fn stale(id: &str, issued: RunId, current: RunId) -> ContractError {
    ContractError::invalid_handle(
        id,
        format!("handle was issued by {issued}, current run is {current}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorSpec;

    fn camera(id: &str, period: f64) -> SensorDefinition {
        SensorDefinition::from_spec(id.into(), EgoId::default(), SensorSpec::scheduled("camera", period))
    }

    #[test]
    fn test_register_sensor_defaults_enabled() {
        let mut registry = SensorRegistry::new(RunId::default());
        let ego = registry.register_ego("ego".into(), "rig").unwrap();
        let sensor = registry.register_sensor(&ego, camera("cam", 0.1)).unwrap();

        assert!(registry.is_enabled(&sensor).unwrap());
        assert_eq!(registry.sensor(&sensor).unwrap().definition().ego_id, "ego");
        assert_eq!(sensor.ego(), "ego");
    }

    #[test]
    fn test_rejects_non_positive_period() {
        let mut registry = SensorRegistry::new(RunId::default());
        let ego = registry.register_ego("ego".into(), "").unwrap();

        let err = registry.register_sensor(&ego, camera("cam", 0.0)).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
        let err = registry.register_sensor(&ego, camera("cam", -1.0)).unwrap_err();
        assert!(err.to_string().contains("period"));
    }

    #[test]
    fn test_manual_sensor_needs_no_period() {
        let mut registry = SensorRegistry::new(RunId::default());
        let ego = registry.register_ego("ego".into(), "").unwrap();
        let manual = SensorDefinition::from_spec("m".into(), EgoId::default(), SensorSpec::manual("camera"));
        assert!(registry.register_sensor(&ego, manual).is_ok());
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut registry = SensorRegistry::new(RunId::default());
        let ego = registry.register_ego("ego".into(), "").unwrap();
        let sensor = registry.register_sensor(&ego, camera("cam", 1.0)).unwrap();

        registry.clear(RunId::default().next());
        assert!(!registry.is_valid_sensor(&sensor));
        assert!(!registry.is_valid_ego(&ego));

        // Same ids in the new run do not revive the old handles
        let ego2 = registry.register_ego("ego".into(), "").unwrap();
        registry.register_sensor(&ego2, camera("cam", 1.0)).unwrap();
        assert!(!registry.is_valid_sensor(&sensor));
        assert!(matches!(
            registry.set_enabled(&sensor, false),
            Err(ContractError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_unregister_ego_removes_its_sensors() {
        let mut registry = SensorRegistry::new(RunId::default());
        let rig_a = registry.register_ego("a".into(), "").unwrap();
        let rig_b = registry.register_ego("b".into(), "").unwrap();
        let cam_a = registry.register_sensor(&rig_a, camera("cam_a", 1.0)).unwrap();
        let cam_b = registry.register_sensor(&rig_b, camera("cam_b", 1.0)).unwrap();

        let removed = registry.unregister_ego(&rig_a).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!registry.is_valid_sensor(&cam_a));
        assert!(registry.is_valid_sensor(&cam_b));
        assert_eq!(registry.ego_count(), 1);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut registry = SensorRegistry::new(RunId::default());
        let ego = registry.register_ego("ego".into(), "").unwrap();
        assert!(registry.register_ego("ego".into(), "").is_err());

        registry.register_sensor(&ego, camera("cam", 1.0)).unwrap();
        assert!(registry.register_sensor(&ego, camera("cam", 1.0)).is_err());
    }

    #[test]
    fn test_allocated_ego_ids_skip_taken_and_restart_per_run() {
        let mut registry = SensorRegistry::new(RunId::default());
        registry.register_ego("ego_0".into(), "").unwrap();
        let first = registry.allocate_ego("front").unwrap();
        let second = registry.allocate_ego("rear").unwrap();
        assert_eq!(first.id(), "ego_1");
        assert_eq!(second.id(), "ego_2");

        registry.clear(RunId::default().next());
        assert_eq!(registry.allocate_ego("front").unwrap().id(), "ego_0");
    }
}
