//! Recorded layer invocations

use candle_core::backprop::GradStore;
use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::stack::{print_frames, Frame};
use crate::error::{Result, TraceError};
use crate::tensor::TensorTree;

/// Whether an item records inference or gradient computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Layer forward call
    Forward,
    /// Gradient computation for a layer call
    Backward,
}

impl ItemKind {
    /// Lowercase name, as used in dumps
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            other => Err(TraceError::InvalidKind(other.to_string())),
        }
    }
}

/// Handle of an item inside its report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub usize);

/// Identity of the layer that produced an item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerRef {
    /// Short type tag, e.g. `Linear`
    pub type_name: String,
    /// Dotted module path, e.g. `encoder.layers.0.fc1`
    pub path: String,
}

impl LayerRef {
    /// Create a layer reference
    pub fn new(type_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            path: path.into(),
        }
    }

    /// Layer reference tagged with the short name of `M`
    pub fn of<M: ?Sized>(path: impl Into<String>) -> Self {
        Self::new(short_type_name::<M>(), path)
    }
}

/// `candle_nn::linear::Linear` -> `Linear`, `Wrapper<foo::Bar>` -> `Wrapper`
fn short_type_name<M: ?Sized>() -> String {
    let full = std::any::type_name::<M>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// One forward or backward invocation of one layer
#[derive(Debug, Clone)]
pub struct ReportItem {
    kind: ItemKind,
    step: usize,
    input: TensorTree,
    output: TensorTree,
    layer: LayerRef,
    structural_id: usize,
    frame_info: Frame,
    frames: Vec<Frame>,
    pub(crate) forward_link: Option<ItemId>,
    pub(crate) backward_link: Option<ItemId>,
    input_grads: Vec<Option<Tensor>>,
}

impl ReportItem {
    /// Record an invocation, deep-cloning `input` and `output`
    ///
    /// Backward items get one unset gradient slot per grad-bearing leaf of
    /// `input`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: ItemKind,
        step: usize,
        input: &TensorTree,
        output: &TensorTree,
        layer: LayerRef,
        structural_id: usize,
        frame_info: Frame,
        frames: Vec<Frame>,
    ) -> Result<Self> {
        let input = input.capture()?;
        let output = output.capture()?;
        let input_grads = match kind {
            ItemKind::Forward => Vec::new(),
            ItemKind::Backward => vec![None; input.grad_leaves().len()],
        };

        Ok(Self {
            kind,
            step,
            input,
            output,
            layer,
            structural_id,
            frame_info,
            frames,
            forward_link: None,
            backward_link: None,
            input_grads,
        })
    }

    pub(crate) fn with_grads(mut self, grads: Vec<Option<Tensor>>) -> Self {
        self.input_grads = grads;
        self
    }

    /// Forward or backward
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Step id assigned at creation
    pub fn step(&self) -> usize {
        self.step
    }

    /// Captured input
    pub fn input(&self) -> &TensorTree {
        &self.input
    }

    /// Captured output
    pub fn output(&self) -> &TensorTree {
        &self.output
    }

    /// Originating layer
    pub fn layer(&self) -> &LayerRef {
        &self.layer
    }

    /// Id shared with the corresponding layer of the other model
    pub fn structural_id(&self) -> usize {
        self.structural_id
    }

    /// Invocation site
    pub fn frame_info(&self) -> &Frame {
        &self.frame_info
    }

    /// Call stack at invocation time, oldest frame first
    pub fn stacks(&self) -> &[Frame] {
        &self.frames
    }

    /// Forward item of a backward item
    pub fn forward_link(&self) -> Option<ItemId> {
        self.forward_link
    }

    /// Backward item of a forward item
    pub fn backward_link(&self) -> Option<ItemId> {
        self.backward_link
    }

    /// Gradient slots (empty for forward items)
    pub fn input_grads(&self) -> &[Option<Tensor>] {
        &self.input_grads
    }

    /// Fill gradient slot `nth`
    pub fn set_input_grads(&mut self, nth: usize, value: Tensor) -> Result<()> {
        let len = self.input_grads.len();
        let slot = self
            .input_grads
            .get_mut(nth)
            .ok_or(TraceError::GradIndex { index: nth, len })?;
        *slot = Some(value);
        Ok(())
    }

    /// Fill every slot whose live input tensor has a gradient in `grads`
    ///
    /// Returns the number of slots filled.
    pub fn fill_input_grads(&mut self, grads: &GradStore) -> usize {
        let mut filled = 0;
        for (slot, leaf) in self.input_grads.iter_mut().zip(self.input.grad_leaves()) {
            if let Some(grad) = leaf.source.and_then(|id| grads.get_id(id)) {
                *slot = Some(grad.detach());
                filled += 1;
            }
        }
        filled
    }

    /// Tensors to diff: outputs for forward items, filled gradients for
    /// backward items
    pub fn compare_tensors(&self) -> Vec<&Tensor> {
        match self.kind {
            ItemKind::Forward => self.output.tensors(),
            ItemKind::Backward => self.input_grads.iter().flatten().collect(),
        }
    }

    /// Print the captured call stack
    pub fn print_stacks(&self) {
        print_frames(&self.frames);
    }
}

impl fmt::Display for ReportItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ReportItem: ")?;
        writeln!(f, "    type={}", self.kind)?;
        write!(f, "    step_idx: {}", self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    fn backward_item(input: &TensorTree) -> ReportItem {
        ReportItem::new(
            ItemKind::Backward,
            1,
            input,
            &TensorTree::None,
            LayerRef::new("Linear", "fc"),
            0,
            Frame::caller("fc"),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("forward".parse::<ItemKind>().unwrap(), ItemKind::Forward);
        assert_eq!("backward".parse::<ItemKind>().unwrap(), ItemKind::Backward);
        assert!(matches!(
            "sideways".parse::<ItemKind>(),
            Err(TraceError::InvalidKind(_))
        ));
    }

    #[test]
    fn test_layer_ref_short_name() {
        let layer = LayerRef::of::<candle_nn::Linear>("fc1");
        assert_eq!(layer.type_name, "Linear");
        assert_eq!(layer.path, "fc1");
        assert_eq!(LayerRef::of::<Vec<u8>>("x").type_name, "Vec");
    }

    #[test]
    fn test_backward_grad_slots() {
        let dev = Device::Cpu;
        let a = Var::new(&[1f32], &dev).unwrap();
        let b = Var::new(&[2f32], &dev).unwrap();
        let c = Tensor::new(&[3f32], &dev).unwrap();
        let input = TensorTree::tuple([a.as_tensor(), &c, b.as_tensor()]);

        let mut item = backward_item(&input);
        assert_eq!(item.input_grads().len(), 2);
        assert!(item.compare_tensors().is_empty());

        let g = Tensor::new(&[0.5f32], &dev).unwrap();
        item.set_input_grads(1, g).unwrap();
        assert!(item.input_grads()[0].is_none());
        assert!(item.input_grads()[1].is_some());
        assert_eq!(item.compare_tensors().len(), 1);

        let err = item
            .set_input_grads(2, Tensor::new(&[0f32], &dev).unwrap())
            .unwrap_err();
        assert!(matches!(err, TraceError::GradIndex { index: 2, len: 2 }));
    }

    #[test]
    fn test_forward_has_no_grad_slots() {
        let dev = Device::Cpu;
        let x = Var::new(&[1f32], &dev).unwrap();
        let mut item = ReportItem::new(
            ItemKind::Forward,
            0,
            &TensorTree::leaf(x.as_tensor()),
            &TensorTree::leaf(x.as_tensor()),
            LayerRef::new("Linear", "fc"),
            0,
            Frame::caller("fc"),
            vec![],
        )
        .unwrap();
        assert!(item.input_grads().is_empty());
        assert_eq!(item.compare_tensors().len(), 1);
        assert!(item.set_input_grads(0, x.as_tensor().clone()).is_err());
    }

    #[test]
    fn test_fill_input_grads_from_store() {
        let dev = Device::Cpu;
        let x = Var::new(&[1f32, 2.0], &dev).unwrap();
        let loss = x.as_tensor().sqr().unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();

        let mut item = backward_item(&TensorTree::leaf(x.as_tensor()));
        assert_eq!(item.fill_input_grads(&grads), 1);
        let g: Vec<f32> = item.compare_tensors()[0].to_vec1().unwrap();
        assert_eq!(g, vec![2.0, 4.0]);
    }

    #[test]
    fn test_display() {
        let item = backward_item(&TensorTree::None);
        let s = item.to_string();
        assert!(s.contains("type=backward"));
        assert!(s.contains("step_idx: 1"));
    }
}
