//! Comparison actions
//!
//! An [`Action`] decides whether two corresponding items agree. The
//! [`ActionRegistry`] picks one per pair of layer type tags.

mod registry;

use anyhow::{bail, Context, Result};

use crate::config::CompareConfig;
use crate::tensor::allclose;
use crate::trace::ReportItem;

pub use registry::{ActionRegistry, STANDARD_LAYERS};

/// Comparison routine for a pair of corresponding items
///
/// Returns an error describing the mismatch when the items disagree.
pub trait Action {
    /// Name shown in logs
    fn name(&self) -> &str {
        "custom"
    }

    /// Compare the reference item with the candidate item
    fn compare(
        &self,
        reference: &ReportItem,
        candidate: &ReportItem,
        config: &CompareConfig,
    ) -> Result<()>;
}

impl<F> Action for F
where
    F: Fn(&ReportItem, &ReportItem, &CompareConfig) -> Result<()>,
{
    fn compare(
        &self,
        reference: &ReportItem,
        candidate: &ReportItem,
        config: &CompareConfig,
    ) -> Result<()> {
        self(reference, candidate, config)
    }
}

/// Every compared tensor must match within tolerance, in order
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualAction;

impl Action for EqualAction {
    fn name(&self) -> &str {
        "equal"
    }

    fn compare(
        &self,
        reference: &ReportItem,
        candidate: &ReportItem,
        config: &CompareConfig,
    ) -> Result<()> {
        let expected = reference.compare_tensors();
        let actual = candidate.compare_tensors();
        if expected.len() != actual.len() {
            bail!(
                "Number of compared tensors differs: {} vs {}",
                expected.len(),
                actual.len()
            );
        }

        for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
            allclose(e, a, config)
                .with_context(|| format!("Tensor {} of {} differs", i, expected.len()))?;
        }
        Ok(())
    }
}
