//! Forward/backward trace comparison
//!
//! Aligns the forward items of two reports by structural id, walks the
//! candidate layer tree comparing each pair with the action registered for
//! its layer types, then does the same for the linked backward items. The
//! first mismatch stops the walk and is reported with the call stacks of
//! both sides.

mod divergence;

use tracing::{debug, info, warn};

use crate::action::ActionRegistry;
use crate::config::CompareConfig;
use crate::error::{Result, TraceError};
use crate::trace::{ItemId, ItemKind, Report, ReportItem};
use crate::view::{TableView, TreeView};

pub use divergence::{CheckOutcome, Divergence, Phase};

fn ensure_kind(expected: ItemKind, reference: &ReportItem, candidate: &ReportItem) -> Result<()> {
    if reference.kind() != expected || candidate.kind() != expected {
        return Err(TraceError::KindMismatch {
            expected: expected.as_str(),
            reference: reference.kind().as_str(),
            candidate: candidate.kind().as_str(),
        });
    }
    Ok(())
}

fn ensure_grads(side: &'static str, item: &ReportItem) -> Result<()> {
    let total = item.input_grads().len();
    let unset = item.input_grads().iter().filter(|g| g.is_none()).count();
    if unset > 0 {
        return Err(TraceError::UnsetGrads {
            side,
            structural_id: item.structural_id(),
            unset,
            total,
        });
    }
    Ok(())
}

/// Backward items of one forward pair
#[derive(Debug, Clone, Copy)]
struct BackwardPair {
    structural_id: usize,
    reference: Option<ItemId>,
    candidate: Option<ItemId>,
}

/// Compare two complete reports
///
/// Structural problems (different forward counts, a candidate layer with no
/// reference counterpart, a pair with no registered action, backward on
/// one side only) are returned as errors. Numeric mismatches end the
/// comparison with [`CheckOutcome::Diverged`].
pub fn compare_reports(
    reference: &Report,
    candidate: &Report,
    registry: &ActionRegistry,
    config: &CompareConfig,
) -> Result<CheckOutcome> {
    let reference_fwd = reference.get_fwd_items();
    let candidate_fwd = candidate.get_fwd_items();
    let reference_count = reference_fwd.len();
    let table = TableView::new(reference_fwd, |item| item.structural_id())?;
    let tree = TreeView::new(candidate_fwd);
    if reference_count != tree.len() {
        return Err(TraceError::CountMismatch {
            reference: reference_count,
            candidate: tree.len(),
        });
    }

    let mut backward_pairs = Vec::with_capacity(tree.len());
    for (idx, cand_item) in tree.traversal_forward().into_iter().enumerate() {
        let ref_item = *table.get(cand_item.structural_id()).ok_or_else(|| {
            TraceError::NoCorrespondingModule {
                layer: cand_item.layer().type_name.clone(),
                structural_id: cand_item.structural_id(),
            }
        })?;
        ensure_kind(ItemKind::Forward, ref_item, cand_item)?;

        backward_pairs.push(BackwardPair {
            structural_id: cand_item.structural_id(),
            reference: ref_item.backward_link(),
            candidate: cand_item.backward_link(),
        });

        let action = registry.get_action(ref_item.layer(), cand_item.layer())?;
        debug!(
            step = idx,
            structural_id = cand_item.structural_id(),
            layer = %cand_item.layer().path,
            "comparing forward pair"
        );
        if let Err(e) = action.compare(ref_item, cand_item, config) {
            warn!(step = idx, structural_id = cand_item.structural_id(), "forward divergence");
            return Ok(CheckOutcome::Diverged {
                forward: idx,
                divergence: Box::new(Divergence::new(
                    Phase::Forward,
                    idx,
                    (reference, ref_item),
                    (candidate, cand_item),
                    &e,
                )),
            });
        }
    }
    let forward = tree.len();
    info!(forward, "forward phase passed");

    for pair in &backward_pairs {
        if pair.reference.is_some() != pair.candidate.is_some() {
            return Err(TraceError::MissingBackward(pair.structural_id));
        }
    }
    let backward_map = TableView::new(
        backward_pairs
            .iter()
            .filter_map(|p| Some((p.reference?, p.candidate?))),
        |&(_, cand)| cand.0,
    )?;

    let mut backward = 0;
    for cand_fwd in tree.traversal_backward() {
        let Some(link) = cand_fwd.backward_link() else {
            continue;
        };
        let idx = backward;
        let &(ref_id, cand_id) = backward_map
            .get(link.0)
            .ok_or(TraceError::UnknownItem(link))?;
        let ref_item = reference.item(ref_id)?;
        let cand_item = candidate.item(cand_id)?;
        ensure_kind(ItemKind::Backward, ref_item, cand_item)?;
        ensure_grads("reference", ref_item)?;
        ensure_grads("candidate", cand_item)?;

        let action = registry.get_action(ref_item.layer(), cand_item.layer())?;
        debug!(
            step = idx,
            structural_id = cand_item.structural_id(),
            layer = %cand_item.layer().path,
            "comparing backward pair"
        );
        if let Err(e) = action.compare(ref_item, cand_item, config) {
            warn!(step = idx, structural_id = cand_item.structural_id(), "backward divergence");
            return Ok(CheckOutcome::Diverged {
                forward,
                divergence: Box::new(Divergence::new(
                    Phase::Backward,
                    idx,
                    (reference, ref_item),
                    (candidate, cand_item),
                    &e,
                )),
            });
        }
        backward += 1;
    }
    info!(backward, "backward phase passed");

    Ok(CheckOutcome::Passed { forward, backward })
}

/// Compare two reports and print the verdict to stdout
///
/// Returns true iff both phases passed without a mismatch.
pub fn check_forward_and_backward(
    reference: &Report,
    candidate: &Report,
    registry: &ActionRegistry,
    config: &CompareConfig,
) -> Result<bool> {
    let outcome = compare_reports(reference, candidate, registry, config)?;
    println!("{}", outcome);
    Ok(outcome.passed())
}
