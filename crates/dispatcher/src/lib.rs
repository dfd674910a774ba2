//! # Dispatcher
//!
//! 输出分发模块。
//!
//! 负责：
//! - 提供 `Endpoint` 实现（`ChannelEndpoint` / `RecordingEndpoint` / `NullEndpoint`）
//! - 消费 `EndpointEvent`，Fan-out 到多个 sinks
//! - 隔离慢 sink，不阻塞仿真线程

pub mod dispatcher;
pub mod endpoints;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{EndpointEvent, EventSink};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use endpoints::{ChannelEndpoint, NullEndpoint, RecordingEndpoint};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
