//! Trace recording
//!
//! - Step counter and call-stack snapshots
//! - Report items and reports
//! - Session scope binding the report being recorded
//! - Instrumentation for candle modules
//! - Dump persistence

pub mod counter;
mod dump;
mod hook;
mod item;
mod report;
mod session;
pub mod stack;

pub use counter::{next_step, reset_steps, Counter};
pub use dump::{META_FILE, TENSOR_FILE};
pub use hook::{record_backward, record_forward, TracedLayer};
pub use item::{ItemId, ItemKind, LayerRef, ReportItem};
pub use report::{Report, SharedReport};
pub use session::{current_report, report_guard, with_report, SessionGuard};
pub use stack::{enter_frame, Frame, FrameGuard};
