//! Instrumentation for candle modules
//!
//! [`TracedLayer`] records a forward item into the current report each time
//! the wrapped module runs. After `loss.backward()`, [`record_backward`]
//! adds the matching backward items and fills their gradients from the
//! `GradStore`.
//!
//! candle keeps gradients only for variables. A traced layer whose input
//! takes part in autograd therefore feeds its module `input + tap`, where
//! `tap` is a zero [`Var`] of the input's shape: the value is unchanged,
//! gradients still flow to the input, and the gradient of `tap` is the
//! gradient of the layer input.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::Module;
use tracing::{debug, warn};

use super::item::{ItemId, ItemKind, LayerRef};
use super::report::Report;
use super::session::current_report;
use super::stack::{enter_frame, snapshot, Frame};
use crate::error::{Result, TraceError};
use crate::tensor::{CapturedTensor, TensorTree};

/// Record a forward item into the current report
pub fn record_forward(
    input: &TensorTree,
    output: &TensorTree,
    layer: LayerRef,
    structural_id: usize,
    frame_info: Frame,
    frames: Vec<Frame>,
) -> Result<ItemId> {
    let report = current_report()?;
    let mut report = report.try_borrow_mut().map_err(|_| TraceError::ReportBusy)?;
    report.put_item(
        ItemKind::Forward,
        input,
        output,
        layer,
        structural_id,
        frame_info,
        frames,
    )
}

/// Add a linked backward item for every forward item that has none
///
/// Only forward items with at least one grad-bearing input take part in
/// backward. Items are created in reverse step order, the order in which
/// backward reaches them, and their slots are filled from `grads`. A slot
/// stays unset when the loss does not depend on that input; comparing
/// such an item fails. Returns the number of backward items created.
pub fn record_backward(report: &mut Report, grads: &GradStore) -> Result<usize> {
    let pending: Vec<ItemId> = report
        .fwd_ids()
        .into_iter()
        .rev()
        .filter(|id| {
            report
                .item(*id)
                .map(|item| {
                    item.backward_link().is_none() && !item.input().grad_leaves().is_empty()
                })
                .unwrap_or(false)
        })
        .collect();

    for &fwd_id in &pending {
        let fwd = report.item(fwd_id)?;
        let input = fwd.input().clone();
        let output = fwd.output().clone();
        let layer = fwd.layer().clone();
        let structural_id = fwd.structural_id();
        let frame_info = fwd.frame_info().clone();
        let frames = fwd.stacks().to_vec();

        let bwd_id = report.put_item(
            ItemKind::Backward,
            &input,
            &output,
            layer,
            structural_id,
            frame_info,
            frames,
        )?;
        report.set_forward(bwd_id, fwd_id)?;
        let bwd = report.item_mut(bwd_id)?;
        let filled = bwd.fill_input_grads(grads);
        if filled < bwd.input_grads().len() {
            warn!(structural_id, filled, slots = bwd.input_grads().len(), "input grads missing");
        }
        debug!(structural_id, filled, "recorded backward item");
    }

    Ok(pending.len())
}

/// A module that records its forward calls
pub struct TracedLayer<M> {
    inner: M,
    layer: LayerRef,
    structural_id: usize,
}

impl<M: Module> TracedLayer<M> {
    /// Wrap `inner`, tagged with its type name, module `path` and the
    /// structural id shared with the other model
    pub fn new(inner: M, path: impl Into<String>, structural_id: usize) -> Self {
        Self {
            inner,
            layer: LayerRef::of::<M>(path),
            structural_id,
        }
    }

    /// Override the type tag used for action lookup
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.layer.type_name = type_name.into();
        self
    }

    /// Wrapped module
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Layer identity
    pub fn layer(&self) -> &LayerRef {
        &self.layer
    }

    /// Structural id
    pub fn structural_id(&self) -> usize {
        self.structural_id
    }

    /// Run the module and record a forward item
    ///
    /// Fails with `NoActiveSession` outside `report_guard`.
    #[track_caller]
    pub fn forward_traced(&self, xs: &Tensor) -> Result<Tensor> {
        let frame_info = Frame::caller(self.layer.path.clone());
        let tap = if xs.is_variable() || xs.track_op() {
            Some(Var::zeros(xs.dims(), xs.dtype(), xs.device())?)
        } else {
            None
        };
        let (module_input, input) = match &tap {
            Some(tap) => (
                (xs + tap.as_tensor())?,
                TensorTree::Leaf(CapturedTensor::tapped(xs, tap.as_tensor().id())),
            ),
            None => (xs.clone(), TensorTree::leaf(xs)),
        };

        let frames;
        let ys = {
            let _frame = enter_frame(frame_info.clone());
            let ys = self.inner.forward(&module_input)?;
            frames = snapshot();
            ys
        };

        record_forward(
            &input,
            &TensorTree::leaf(&ys),
            self.layer.clone(),
            self.structural_id,
            frame_info,
            frames,
        )?;
        Ok(ys)
    }
}

impl<M: Module> Module for TracedLayer<M> {
    #[track_caller]
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.forward_traced(xs)
            .map_err(|e| candle_core::Error::Msg(e.to_string()))
    }
}
