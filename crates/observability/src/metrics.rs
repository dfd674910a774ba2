//! 采集调度指标收集模块
//!
//! 记录 tick 调度、capture 生命周期、异步 future 以及 endpoint 输出的运行指标。

use std::collections::HashMap;

use contracts::Capture;
use metrics::{counter, gauge, histogram};

/// 记录一次 tick
///
/// `delta_time` 为引擎 delta（已乘 time_scale），`unscaled_delta_time` 为调度 delta。
pub fn record_tick(delta_time: f64, unscaled_delta_time: f64, due_sensors: usize) {
    counter!("perception_sim_ticks_total").increment(1);
    histogram!("perception_sim_tick_delta_seconds").record(delta_time);
    histogram!("perception_sim_tick_unscaled_delta_seconds").record(unscaled_delta_time);
    gauge!("perception_sim_due_sensors").set(due_sensors as f64);
}

/// 记录 time_scale 在序列中途被修改
pub fn record_time_scale_violation() {
    counter!("perception_sim_time_scale_violations_total").increment(1);
}

/// 记录新序列开始
pub fn record_sequence_started(sequence: u64) {
    counter!("perception_sim_sequences_total").increment(1);
    gauge!("perception_sim_current_sequence").set(sequence as f64);
}

/// 记录 capture 打开
pub fn record_capture_opened(sensor_label: &str) {
    counter!(
        "perception_sim_captures_opened_total",
        "sensor_id" => sensor_label.to_string()
    )
    .increment(1);
}

/// 记录 capture 完成并交给 endpoint
///
/// `latency_ticks` 为从打开到完成经过的 tick 数。
pub fn record_capture_finalized(sensor_label: &str, latency_ticks: u64) {
    counter!(
        "perception_sim_captures_finalized_total",
        "sensor_id" => sensor_label.to_string()
    )
    .increment(1);
    histogram!("perception_sim_capture_latency_ticks").record(latency_ticks as f64);
}

/// 记录因 reset 而丢弃的未完成 capture
pub fn record_capture_discarded(sensor_label: &str, unresolved_slots: usize) {
    counter!(
        "perception_sim_captures_discarded_total",
        "sensor_id" => sensor_label.to_string()
    )
    .increment(1);
    counter!("perception_sim_futures_abandoned_total").increment(unresolved_slots as u64);
}

/// 记录当前仍打开的 capture 数量
pub fn record_pending_captures(count: usize) {
    gauge!("perception_sim_pending_captures").set(count as f64);
}

/// 记录异步 future 发放
pub fn record_future_issued(slot_kind: &'static str) {
    counter!("perception_sim_futures_issued_total", "slot" => slot_kind).increment(1);
}

/// 记录异步 future 解析
pub fn record_future_resolved(slot_kind: &'static str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "perception_sim_futures_resolved_total",
        "slot" => slot_kind,
        "status" => status
    )
    .increment(1);
}

/// 记录 annotation / metric 定义注册
pub fn record_definition_registered(kind: &'static str, renamed: bool) {
    counter!("perception_sim_definitions_registered_total", "kind" => kind).increment(1);
    if renamed {
        counter!("perception_sim_definitions_renamed_total", "kind" => kind).increment(1);
    }
}

/// 记录 endpoint 回调结果
pub fn record_endpoint_event(endpoint: &str, event: &'static str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "perception_sim_endpoint_events_total",
        "endpoint" => endpoint.to_string(),
        "event" => event,
        "status" => status
    )
    .increment(1);
}

/// 记录 sink 写入结果
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "perception_sim_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 采集指标聚合器
///
/// 在内存中聚合一次运行的指标，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct CaptureMetricsAggregator {
    /// 总 tick 数
    pub total_ticks: u64,

    /// 由传感器约束时长的 tick 数
    pub constrained_ticks: u64,

    /// 完成的 capture 总数
    pub total_captures: u64,

    /// 丢弃的 capture 总数
    pub total_discarded: u64,

    /// time_scale 违规次数
    pub time_scale_violations: u64,

    /// tick delta（引擎秒）统计
    pub delta_stats: RunningStats,

    /// capture 完成延迟（tick）统计
    pub latency_stats: RunningStats,

    /// 各传感器完成的 capture 数
    pub sensor_captures: HashMap<String, u64>,
}

impl CaptureMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次 tick
    pub fn update_tick(&mut self, delta_time: f64, constrained: bool) {
        self.total_ticks += 1;
        if constrained {
            self.constrained_ticks += 1;
        }
        self.delta_stats.push(delta_time);
    }

    /// 记录一个完成的 capture
    pub fn update_capture(&mut self, capture: &Capture, latency_ticks: u64) {
        self.total_captures += 1;
        self.latency_stats.push(latency_ticks as f64);
        *self
            .sensor_captures
            .entry(capture.sensor_label().to_string())
            .or_insert(0) += 1;
    }

    /// 记录丢弃的 capture
    pub fn update_discarded(&mut self, count: u64) {
        self.total_discarded += count;
    }

    /// 记录 time_scale 违规
    pub fn update_time_scale_violation(&mut self) {
        self.time_scale_violations += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let attempted = self.total_captures + self.total_discarded;
        MetricsSummary {
            total_ticks: self.total_ticks,
            constrained_ticks: self.constrained_ticks,
            total_captures: self.total_captures,
            total_discarded: self.total_discarded,
            time_scale_violations: self.time_scale_violations,
            discard_rate: if attempted > 0 {
                self.total_discarded as f64 / attempted as f64 * 100.0
            } else {
                0.0
            },
            tick_delta: StatsSummary::from(&self.delta_stats),
            capture_latency_ticks: StatsSummary::from(&self.latency_stats),
            sensor_captures: self.sensor_captures.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_ticks: u64,
    pub constrained_ticks: u64,
    pub total_captures: u64,
    pub total_discarded: u64,
    pub time_scale_violations: u64,
    pub discard_rate: f64,
    pub tick_delta: StatsSummary,
    pub capture_latency_ticks: StatsSummary,
    pub sensor_captures: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Capture Metrics Summary ===")?;
        writeln!(
            f,
            "Ticks: {} ({} sensor-constrained)",
            self.total_ticks, self.constrained_ticks
        )?;
        writeln!(f, "Captures finalized: {}", self.total_captures)?;
        writeln!(
            f,
            "Captures discarded: {} ({:.2}%)",
            self.total_discarded, self.discard_rate
        )?;
        if self.time_scale_violations > 0 {
            writeln!(f, "Time scale violations: {}", self.time_scale_violations)?;
        }
        writeln!(f, "Tick delta (s): {}", self.tick_delta)?;
        writeln!(f, "Capture latency (ticks): {}", self.capture_latency_ticks)?;

        if !self.sensor_captures.is_empty() {
            writeln!(f, "Captures per sensor:")?;
            let mut sensors: Vec<_> = self.sensor_captures.iter().collect();
            sensors.sort();
            for (sensor, count) in sensors {
                writeln!(f, "  {}: {}", sensor, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CaptureId;

    fn capture(sensor: Option<&str>) -> Capture {
        Capture::new(CaptureId::new(0), 0, 0, 0.0, sensor.map(Into::into), None)
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [2.0, 4.0, 4.0, 4.0, 6.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 4.0).abs() < 1e-10);
        assert!((stats.min() - 2.0).abs() < 1e-10);
        assert!((stats.max() - 6.0).abs() < 1e-10);
        assert!((stats.variance() - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_counts_per_sensor() {
        let mut aggregator = CaptureMetricsAggregator::new();
        aggregator.update_tick(0.5, true);
        aggregator.update_tick(0.0, false);
        aggregator.update_capture(&capture(Some("rgb")), 0);
        aggregator.update_capture(&capture(Some("rgb")), 2);
        aggregator.update_capture(&capture(None), 0);
        aggregator.update_discarded(1);

        let summary = aggregator.summary();
        assert_eq!(summary.total_ticks, 2);
        assert_eq!(summary.constrained_ticks, 1);
        assert_eq!(summary.total_captures, 3);
        assert_eq!(summary.sensor_captures.get("rgb"), Some(&2));
        assert_eq!(summary.sensor_captures.get("-"), Some(&1));
        assert!((summary.discard_rate - 25.0).abs() < 1e-10);
        assert_eq!(summary.capture_latency_ticks.max, 2.0);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = CaptureMetricsAggregator::new();
        aggregator.update_capture(&capture(Some("depth")), 1);
        let text = aggregator.summary().to_string();
        assert!(text.contains("Captures finalized: 1"));
        assert!(text.contains("depth: 1"));
    }

    #[test]
    fn test_empty_stats_display() {
        let summary = StatsSummary::from(&RunningStats::default());
        assert_eq!(summary.to_string(), "N/A");
    }

    #[test]
    fn test_reset() {
        let mut aggregator = CaptureMetricsAggregator::new();
        aggregator.update_tick(1.0, true);
        aggregator.update_time_scale_violation();
        aggregator.reset();
        assert_eq!(aggregator.summary().total_ticks, 0);
        assert_eq!(aggregator.time_scale_violations, 0);
    }
}
