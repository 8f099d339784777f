//! # layerdiff - layer-by-layer trace comparison
//!
//! Finds the first layer where two implementations of the same network
//! disagree, in the forward outputs or in the backward gradients.
//!
//! ## Features
//!
//! - Records forward/backward layer invocations of candle models into reports
//! - Aligns two reports by structural id even when the layer trees differ
//! - Pluggable comparison actions keyed by layer type pairs
//! - Stops at the first divergence and prints the call stacks of both sides
//! - Reports can be saved to disk and compared from the command line
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use layerdiff::{check_forward_and_backward, report_guard, ActionRegistry, CompareConfig, Report};
//!
//! let reference = Report::shared("reference");
//! {
//!     let _guard = report_guard(reference.clone());
//!     reference_model.forward(&x)?;
//! }
//! // ... same for the candidate model ...
//! let ok = check_forward_and_backward(
//!     &reference.borrow(),
//!     &candidate.borrow(),
//!     &ActionRegistry::standard(),
//!     &CompareConfig::default(),
//! )?;
//! ```

#![warn(missing_docs)]
#![allow(rustdoc::missing_crate_level_docs)]

pub mod action;
pub mod config;
pub mod engine;
pub mod error;
pub mod tensor;
pub mod trace;
pub mod view;

// Re-exports for convenience
pub use action::{Action, ActionRegistry, EqualAction};
pub use config::CompareConfig;
pub use engine::{check_forward_and_backward, compare_reports, CheckOutcome, Divergence, Phase};
pub use error::{Result, TraceError};
pub use tensor::TensorTree;
pub use trace::{
    current_report, record_backward, report_guard, with_report, ItemId, ItemKind, LayerRef,
    Report, ReportItem, SharedReport, TracedLayer,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
