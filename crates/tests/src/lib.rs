//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试（事件与 payload 的 JSON 形状）
//! - 控制器 e2e 测试（调度、异步上报、reset）
//! - 配置 -> rig -> dispatcher -> 文件输出的完整链路

#[cfg(test)]
mod contract_tests {
    use contracts::{Capture, CaptureId, EndpointEvent, Payload};

    #[test]
    fn test_endpoint_event_tagging() {
        let capture = Capture::new(CaptureId::new(3), 0, 1, 0.5, Some("camera".into()), None);
        let event = EndpointEvent::FrameGenerated { capture };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "frame_generated");
        assert_eq!(json["capture"]["step"], 1);
        assert_eq!(json["capture"]["sensor_id"], "camera");

        let back: EndpointEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_value(Payload::Values(vec![1.0, 2.0])).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "values", "data": [1.0, 2.0]}));

        let json = serde_json::to_value(Payload::File {
            path: "camera/step_0.png".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["data"]["path"], "camera/step_0.png");
    }
}

#[cfg(test)]
mod e2e_tests {
    use contracts::{ContractError, SchedulerConfig, SensorSpec};
    use controller::{MetricScope, SimulationController};
    use dispatcher::RecordingEndpoint;

    fn controller(endpoint: &RecordingEndpoint) -> SimulationController {
        SimulationController::new(SchedulerConfig::default(), Box::new(endpoint.clone()))
    }

    fn timestamps_of(endpoint: &RecordingEndpoint, sensor: &str) -> Vec<f64> {
        endpoint
            .captures()
            .iter()
            .filter(|c| c.sensor_id.as_deref() == Some(sensor))
            .map(|c| c.timestamp)
            .collect()
    }

    /// 两个不同周期的传感器：tick 时长取最近的到期时间
    #[test]
    fn test_multi_rate_schedule() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller = controller(&endpoint);
        let ego = controller.register_ego("rig").unwrap();
        let camera = controller
            .register_sensor(&ego, SensorSpec::scheduled("camera", 1.0))
            .unwrap();
        let lidar = controller
            .register_sensor(&ego, SensorSpec::scheduled("lidar", 0.5))
            .unwrap();

        let mut steps = Vec::new();
        for _ in 0..5 {
            let tick = controller.tick().unwrap();
            steps.push(tick.step);
            for sensor in [&camera, &lidar] {
                if tick.is_due(sensor.id()) {
                    controller.report_sensor(sensor, vec![tick.timestamp]).unwrap();
                }
            }
        }
        let summary = controller.reset_simulation().unwrap();

        assert_eq!(steps, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(timestamps_of(&endpoint, "camera"), vec![0.0, 1.0, 2.0]);
        assert_eq!(timestamps_of(&endpoint, "lidar"), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(summary.total_frames, 8);
        assert!(summary.is_clean());
    }

    /// 异步 future 乱序完成：就绪的 capture 先发出
    #[test]
    fn test_async_reports_out_of_order() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller = controller(&endpoint);
        let ego = controller.register_ego("rig").unwrap();
        let camera = controller
            .register_sensor(&ego, SensorSpec::scheduled("camera", 1.0))
            .unwrap();

        controller.tick().unwrap();
        let first = controller.report_sensor_async(&camera).unwrap();
        controller.tick().unwrap();
        let second = controller.report_sensor_async(&camera).unwrap();

        second.report(vec![2.0]).unwrap();
        controller.tick().unwrap();
        controller.report_sensor(&camera, vec![3.0]).unwrap();
        assert_eq!(timestamps_of(&endpoint, "camera"), vec![1.0]);

        first.report(vec![1.0]).unwrap();
        assert!(matches!(
            first.report(vec![9.0]),
            Err(ContractError::AlreadyReported { .. })
        ));

        let summary = controller.reset_simulation().unwrap();
        assert!(summary.is_clean());
        assert_eq!(timestamps_of(&endpoint, "camera"), vec![1.0, 0.0, 2.0]);
    }

    /// reset 丢弃未完成的 capture，并使其 future 失效
    #[test]
    fn test_reset_discards_unresolved() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller = controller(&endpoint);
        let ego = controller.register_ego("rig").unwrap();
        let camera = controller
            .register_sensor(&ego, SensorSpec::scheduled("camera", 1.0))
            .unwrap();

        controller.tick().unwrap();
        let future = controller.report_sensor_async(&camera).unwrap();

        let summary = controller.reset_simulation().unwrap();
        assert_eq!(summary.discarded.len(), 1);
        assert_eq!(summary.total_frames, 0);
        assert!(!future.is_valid());
        assert!(matches!(
            future.report(vec![1.0]),
            Err(ContractError::FutureInvalidated { .. })
        ));

        assert!(endpoint.captures().is_empty());
        assert_eq!(endpoint.kinds().last(), Some(&"simulation_completed"));
    }

    /// 全局 metric 进入不属于任何传感器的 capture
    #[test]
    fn test_metrics_scoped_to_annotation_and_tick() {
        let endpoint = RecordingEndpoint::new("recording");
        let mut controller = controller(&endpoint);
        let boxes = controller
            .register_annotation_definition(contracts::AnnotationDefinition::new(
                "boxes", "2d boxes",
            ))
            .unwrap();
        let count = controller
            .register_metric_definition(contracts::MetricDefinition::new("count", "objects"))
            .unwrap();
        let ego = controller.register_ego("rig").unwrap();
        let camera = controller
            .register_sensor(&ego, SensorSpec::scheduled("camera", 1.0))
            .unwrap();

        controller.tick().unwrap();
        let annotation = controller
            .report_annotation(&camera, &boxes.id, serde_json::json!({"boxes": 2}))
            .unwrap();
        controller
            .report_metric(MetricScope::Annotation(&annotation), &count.id, vec![2.0])
            .unwrap();
        controller
            .report_metric(MetricScope::Global, &count.id, vec![5.0])
            .unwrap();
        controller.reset_simulation().unwrap();

        let captures = endpoint.captures();
        assert_eq!(captures.len(), 2);

        let camera_capture = captures.iter().find(|c| c.sensor_id.is_some()).unwrap();
        assert_eq!(camera_capture.annotations.len(), 1);
        assert_eq!(
            camera_capture.metrics[0].annotation_id,
            Some(annotation.annotation_id)
        );

        let global = captures.iter().find(|c| c.sensor_id.is_none()).unwrap();
        assert_eq!(global.step, camera_capture.step);
        assert_eq!(global.metrics[0].value, contracts::Payload::Values(vec![5.0]));
    }
}

#[cfg(test)]
mod pipeline_tests {
    use std::path::Path;

    use config_loader::{ConfigFormat, ConfigLoader};
    use controller::{RunPlan, SimulationController, SimulationRunner};
    use dispatcher::{create_dispatcher, ChannelEndpoint};
    use producers::RigBuilder;

    fn scenario(base_path: &Path) -> String {
        format!(
            r#"
            [simulation]
            ticks_per_sequence = 3
            sequences = 2

            [[annotations]]
            id = "boxes"
            type = "bounding box"

            [[metrics]]
            id = "object_count"

            [[egos]]
            description = "test rig"

            [[egos.sensors]]
            id = "camera"
            modality = "camera"
            period = 0.5
            output = {{ mode = "immediate" }}

            [[egos.sensors.labelers]]
            definition = "boxes"
            kind = "annotation"

            [[egos.sensors.labelers]]
            definition = "object_count"
            kind = "global_metric"

            [[endpoints]]
            name = "files"
            endpoint_type = "file"
            params = {{ base_path = "{}" }}

            [[endpoints]]
            name = "log"
            endpoint_type = "log"
            queue_capacity = 8
            "#,
            base_path.display()
        )
    }

    /// 配置 -> rig -> runner -> dispatcher -> 文件
    #[tokio::test]
    async fn test_scenario_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = ConfigLoader::load_from_str(&scenario(dir.path()), ConfigFormat::Toml)
            .unwrap();

        let (endpoint, rx) = ChannelEndpoint::new("dispatcher");
        let dispatcher = create_dispatcher(blueprint.endpoints.clone(), rx)
            .await
            .unwrap();
        let dispatcher_task = dispatcher.spawn();

        let mut controller =
            SimulationController::new(blueprint.to_scheduler_config(), Box::new(endpoint));
        controller.report_metadata("scenario", "integration");
        let rig = RigBuilder::new(&blueprint).build(&mut controller).unwrap();
        assert!(rig.readback().is_none());

        let mut runner = SimulationRunner::new(controller);
        for producer in rig.into_producers() {
            runner.add_producer(producer);
        }
        let plan = RunPlan {
            ticks_per_sequence: blueprint.simulation.ticks_per_sequence,
            sequences: blueprint.simulation.sequences,
        };

        let outcome = tokio::task::spawn_blocking(move || {
            let outcome = runner.run(plan);
            drop(runner);
            outcome
        })
        .await
        .unwrap()
        .unwrap();

        // camera + global capture on each of 6 ticks
        assert_eq!(outcome.reset.total_frames, 12);
        assert_eq!(outcome.reset.total_sequences, 2);

        let sink_metrics = dispatcher_task.await.unwrap();
        assert_eq!(sink_metrics.len(), 2);
        assert!(sink_metrics.iter().all(|(_, m)| m.failure_count == 0));

        let run_dir = dir.path().join("run_0");
        assert!(run_dir.join("metadata_started.json").exists());
        assert!(run_dir.join("sensors/camera.json").exists());
        assert!(run_dir.join("annotations/boxes.json").exists());
        assert!(run_dir.join("metrics/object_count.json").exists());

        for sequence in 0..2 {
            let sequence_dir = run_dir.join(format!("sequence_{sequence}"));
            let files = std::fs::read_dir(&sequence_dir).unwrap().count();
            assert_eq!(files, 6, "unexpected file count in {}", sequence_dir.display());
        }

        let capture: contracts::Capture = serde_json::from_str(
            &std::fs::read_to_string(run_dir.join("sequence_1/step_0_camera.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(capture.sequence, 1);
        assert_eq!(capture.annotations.len(), 1);

        let completed: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(run_dir.join("metadata_completed.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(completed["scenario"], "integration");
    }
}
