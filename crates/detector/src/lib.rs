//! # Detector
//!
//! 采样循环使用的高度变化检测。
//!
//! 职责：
//! - 维护按时间窗口保留的样本历史 (`RingBuffer`)
//! - 运行 Idle / Recording / Stabilizing 状态机 (`ChangeDetector`)
//! - 将关闭的录制连同回溯历史生成 `Event` (`EventAssembler`)
//!
//! 这里的一切都是同步的，由单个任务持有；没有锁。
//!
//! ## 使用示例
//!
//! ```ignore
//! use detector::DetectionCore;
//!
//! let mut core = DetectionCore::new(&blueprint, queue.next_sequence());
//! if let Some(event) = core.ingest(sample) {
//!     handoff.submit(event);
//! }
//! ```

mod assembler;
mod change;
mod detection;
mod ring_buffer;

// Re-exports
pub use assembler::EventAssembler;
pub use change::{ChangeDetector, DetectorPhase, DetectorState, Transition, TIME_EPSILON};
pub use detection::DetectionCore;
pub use ring_buffer::RingBuffer;
