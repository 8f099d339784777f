//! Comparison outcome and its console rendering

use std::fmt;

use crate::trace::stack::format_frames;
use crate::trace::{Frame, LayerRef, Report, ReportItem};

/// Phase of the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Layer outputs
    Forward,
    /// Input gradients
    Backward,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Self::Forward => "Forward ",
            Self::Backward => "Backward",
        }
    }
}

/// First mismatch found by the engine
#[derive(Debug, Clone)]
pub struct Divergence {
    /// Phase the mismatch was found in
    pub phase: Phase,
    /// Zero-based position within the phase traversal
    pub index: usize,
    /// Reference report name
    pub reference_name: String,
    /// Candidate report name
    pub candidate_name: String,
    /// Structural id on the reference side
    pub reference_id: usize,
    /// Structural id on the candidate side
    pub candidate_id: usize,
    /// Reference layer
    pub reference_layer: LayerRef,
    /// Candidate layer
    pub candidate_layer: LayerRef,
    /// Error raised by the comparison action, with its causes
    pub error: String,
    /// Reference call stack, oldest frame first
    pub reference_stack: Vec<Frame>,
    /// Candidate call stack, oldest frame first
    pub candidate_stack: Vec<Frame>,
}

impl Divergence {
    pub(crate) fn new(
        phase: Phase,
        index: usize,
        (reference, reference_item): (&Report, &ReportItem),
        (candidate, candidate_item): (&Report, &ReportItem),
        error: &anyhow::Error,
    ) -> Self {
        Self {
            phase,
            index,
            reference_name: reference.name().to_string(),
            candidate_name: candidate.name().to_string(),
            reference_id: reference_item.structural_id(),
            candidate_id: candidate_item.structural_id(),
            reference_layer: reference_item.layer().clone(),
            candidate_layer: candidate_item.layer().clone(),
            error: format!("{:#}", error),
            reference_stack: reference_item.stacks().to_vec(),
            candidate_stack: candidate_item.stacks().to_vec(),
        }
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FAILED !!!")?;
        writeln!(
            f,
            "    Diff found in `{} Stage` in step: {}, net_id is {} vs {}",
            self.phase.label(),
            self.index,
            self.candidate_id,
            self.reference_id
        )?;
        writeln!(
            f,
            "    Type of layer is  : {} vs {}",
            self.candidate_layer.type_name, self.reference_layer.type_name
        )?;
        writeln!(f, "{}", self.error)?;
        writeln!(f, "\n\n{} Stacks:", self.candidate_name)?;
        writeln!(f, "=========================")?;
        write!(f, "{}", format_frames(&self.candidate_stack))?;
        writeln!(f, "{} Stacks:", self.reference_name)?;
        writeln!(f, "=========================")?;
        write!(f, "{}", format_frames(&self.reference_stack))
    }
}

/// Verdict of a full comparison
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// Both phases passed
    Passed {
        /// Forward pairs compared
        forward: usize,
        /// Backward pairs compared
        backward: usize,
    },
    /// A mismatch stopped the comparison
    Diverged {
        /// Forward pairs compared before stopping (all of them when the
        /// mismatch is in the backward phase)
        forward: usize,
        /// The mismatch
        divergence: Box<Divergence>,
    },
}

impl CheckOutcome {
    /// True if both phases passed
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    /// The mismatch, if any
    pub fn divergence(&self) -> Option<&Divergence> {
        match self {
            Self::Passed { .. } => None,
            Self::Diverged { divergence, .. } => Some(&**divergence),
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed { forward, backward } => {
                writeln!(f, "forward {} steps compared.", forward)?;
                writeln!(f, "backward {} steps compared.", backward)?;
                write!(f, "SUCCESS !!!")
            }
            Self::Diverged {
                forward,
                divergence,
            } => {
                if divergence.phase == Phase::Backward {
                    writeln!(f, "forward {} steps compared.", forward)?;
                }
                write!(f, "{}", divergence)
            }
        }
    }
}
