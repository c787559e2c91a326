//! # Dispatcher
//!
//! 事件投递。
//!
//! 职责：
//! - 将采样循环中关闭的事件无阻塞地交给同步 worker
//! - 将未投递的事件持久化到离线队列
//! - 按关闭顺序投递到远端 Sink，失败时以有上限的退避重试

pub mod backoff;
pub mod error;
pub mod handoff;
pub mod metrics;
pub mod queue;
pub mod sinks;
pub mod worker;

pub use backoff::Backoff;
pub use contracts::{Event, EventSink};
pub use error::DispatcherError;
pub use handoff::{EventHandoff, HandoffOutcome};
pub use queue::{EnqueueOutcome, OfflineQueue, QueueSnapshot, DATA_LOSS_TARGET};
pub use sinks::{
    create_sink, ConfiguredSink, Envelope, FileSink, LogSink, NetworkFormat, NetworkSink, ACK, NAK,
};
pub use worker::{SyncWorker, SyncWorkerConfig};

pub use crate::metrics::{DeliveryMetrics, DeliverySnapshot};
