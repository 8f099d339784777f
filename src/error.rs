//! Error types for trace recording and comparison
//!
//! Everything here is structural: a malformed trace or a broken
//! correspondence between the two models. Numeric mismatches are not
//! errors of this kind; actions report them through `anyhow::Error` and
//! the engine turns them into a failure report.

use thiserror::Error;

use crate::trace::ItemId;

/// Result type alias for trace operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Structural errors that abort recording or comparison
#[derive(Error, Debug)]
pub enum TraceError {
    /// Item kind string is neither `forward` nor `backward`
    #[error("type can only be one of ['forward', 'backward'], got `{0}`")]
    InvalidKind(String),

    /// `set_forward` called on an item that is not a backward item
    #[error("can't set forward for non-backward item (step {0})")]
    NotBackward(usize),

    /// Backward item linked to something that is not a forward item
    #[error("item at step {0} is not a forward item")]
    NotForward(usize),

    /// Item already carries a link
    #[error("item at step {0} is already linked")]
    AlreadyLinked(usize),

    /// Forward item recorded after the backward item it would be linked to
    #[error("forward item (step {forward}) must precede its backward item (step {backward})")]
    LinkOrder {
        /// Step of the forward item
        forward: usize,
        /// Step of the backward item
        backward: usize,
    },

    /// Gradient slot index out of range
    #[error("input grad index {index} out of range ({len} slots)")]
    GradIndex {
        /// Requested slot
        index: usize,
        /// Number of grad slots on the item
        len: usize,
    },

    /// Session accessor used outside `report_guard`
    #[error("Please call `current_report()` within `report_guard(Report)`.")]
    NoActiveSession,

    /// The current report is borrowed elsewhere while a layer records into it
    #[error("the current report is borrowed while a traced layer records into it")]
    ReportBusy,

    /// A backward item reached comparison with gradient slots never filled
    #[error(
        "{side} backward item of structural id {structural_id} has {unset} of {total} input grads unset"
    )]
    UnsetGrads {
        /// `reference` or `candidate`
        side: &'static str,
        /// Structural id of the pair
        structural_id: usize,
        /// Slots without a gradient
        unset: usize,
        /// Total slots
        total: usize,
    },

    /// The two sides recorded a different number of forward items
    #[error(
        "Different number of reference ({reference}) and candidate ({candidate}) forward items, \
         make sure both models have the same valid sublayers."
    )]
    CountMismatch {
        /// Forward items on the reference side
        reference: usize,
        /// Forward items on the candidate side
        candidate: usize,
    },

    /// No reference item carries the candidate's structural id
    #[error("Reference has no corresponding module for {layer} (structural id {structural_id})")]
    NoCorrespondingModule {
        /// Candidate layer type
        layer: String,
        /// Structural id that failed to resolve
        structural_id: usize,
    },

    /// Key seen twice while building a table view
    #[error("duplicate key {0} in table view, correspondence is ambiguous")]
    DuplicateId(usize),

    /// Paired items have unexpected kinds
    #[error("expected two {expected} items, got {reference} vs {candidate}")]
    KindMismatch {
        /// Kind required by the phase
        expected: &'static str,
        /// Kind found on the reference side
        reference: &'static str,
        /// Kind found on the candidate side
        candidate: &'static str,
    },

    /// Only one side of a forward pair ran backward
    #[error("structural id {0} has a backward item on one side only")]
    MissingBackward(usize),

    /// Action registry has no routine for a layer type pair
    #[error("no comparison action registered for `{0}` vs `{1}`")]
    NoAction(String, String),

    /// Item handle does not belong to the report
    #[error("unknown item {0:?}")]
    UnknownItem(ItemId),

    /// Tensor operation failed while capturing
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Saving or loading a report dump failed
    #[error("dump error: {0}")]
    Dump(String),
}

impl From<std::io::Error> for TraceError {
    fn from(e: std::io::Error) -> Self {
        Self::Dump(e.to_string())
    }
}

impl From<serde_yaml::Error> for TraceError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Dump(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_mismatch_message() {
        let err = TraceError::CountMismatch {
            reference: 3,
            candidate: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("(3)"));
        assert!(msg.contains("(2)"));
    }

    #[test]
    fn test_no_corresponding_module_message() {
        let err = TraceError::NoCorrespondingModule {
            layer: "Linear".to_string(),
            structural_id: 5,
        };
        assert!(err.to_string().contains("no corresponding module for Linear"));
    }
}
