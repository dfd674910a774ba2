//! 配置校验模块
//!
//! 校验规则：
//! - 字段级约束 (`validator` derive)
//! - sensor id 全局唯一，definition id 与 sensor id 共用命名空间
//! - scheduled 传感器 period > 0；manual_affects_timing 同样要求 period > 0
//! - labeler 引用的 definition 已声明且类型匹配
//! - endpoint 名称非空且唯一

use std::collections::HashSet;

use contracts::{
    CaptureTriggerMode, ContractError, LabelerKind, ScenarioBlueprint, SensorConfig,
};
use validator::Validate;

/// 校验 ScenarioBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_ids(blueprint)?;
    validate_cadences(blueprint)?;
    validate_labelers(blueprint)?;
    validate_endpoints(blueprint)?;
    Ok(())
}

/// 字段级约束
fn validate_fields(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("blueprint", e.to_string()))
}

/// 校验 id 唯一性 (sensor 与 definition 共用命名空间)
fn validate_ids(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for sensor in blueprint.all_sensors() {
        if !seen.insert(sensor.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("sensors[id={}]", sensor.id),
                "duplicate sensor id",
            ));
        }
    }

    let definitions = blueprint
        .annotations
        .iter()
        .map(|d| ("annotations", d))
        .chain(blueprint.metrics.iter().map(|d| ("metrics", d)));
    for (section, definition) in definitions {
        if !seen.insert(definition.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("{section}[id={}]", definition.id),
                "duplicate id (sensors, annotations and metrics share one namespace)",
            ));
        }
    }
    Ok(())
}

/// 校验采集节奏
fn validate_cadences(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    for sensor in blueprint.all_sensors() {
        check_cadence(sensor)?;
    }
    Ok(())
}

fn check_cadence(sensor: &SensorConfig) -> Result<(), ContractError> {
    let needs_period = match sensor.trigger_mode {
        CaptureTriggerMode::Scheduled => true,
        CaptureTriggerMode::Manual => sensor.manual_affects_timing,
    };
    if needs_period && !(sensor.period.is_finite() && sensor.period > 0.0) {
        return Err(ContractError::config_validation(
            format!("sensors[{}].period", sensor.id),
            format!("period must be > 0, got {}", sensor.period),
        ));
    }
    if !sensor.first_capture_time.is_finite() {
        return Err(ContractError::config_validation(
            format!("sensors[{}].first_capture_time", sensor.id),
            "first_capture_time must be finite",
        ));
    }
    Ok(())
}

/// 校验 labeler 引用
fn validate_labelers(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    let annotations: HashSet<_> = blueprint.annotations.iter().map(|d| d.id.as_str()).collect();
    let metrics: HashSet<_> = blueprint.metrics.iter().map(|d| d.id.as_str()).collect();

    for sensor in blueprint.all_sensors() {
        for (idx, labeler) in sensor.labelers.iter().enumerate() {
            let (declared, section) = match labeler.kind {
                LabelerKind::Annotation => (&annotations, "annotations"),
                LabelerKind::Metric | LabelerKind::GlobalMetric => (&metrics, "metrics"),
            };
            if !declared.contains(labeler.definition.as_str()) {
                return Err(ContractError::config_validation(
                    format!("sensors[{}].labelers[{}].definition", sensor.id, idx),
                    format!(
                        "definition '{}' not found in [{}]",
                        labeler.definition, section
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// 校验 endpoint 配置
fn validate_endpoints(blueprint: &ScenarioBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, endpoint) in blueprint.endpoints.iter().enumerate() {
        if endpoint.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("endpoints[{}].name", idx),
                "endpoint name cannot be empty",
            ));
        }
        if !seen.insert(endpoint.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("endpoints[{}].name", idx),
                format!("duplicate endpoint name '{}'", endpoint.name),
            ));
        }
    }
    Ok(())
}
