//! Captured tensor structures
//!
//! Layer inputs and outputs are nested containers of tensors. A
//! [`TensorTree`] keeps that nesting so the two sides can be flattened in
//! the same order, and [`TensorTree::capture`] takes the deep copy that
//! decouples a recorded snapshot from the live tensors.

pub mod compare;

use candle_core::{Result, Tensor, TensorId};

pub use compare::{allclose, compare_values, TensorDiff};

/// A single tensor leaf together with its autograd facts
#[derive(Debug, Clone)]
pub struct CapturedTensor {
    /// Tensor value (a detached copy once captured)
    pub value: Tensor,
    /// Whether the live tensor took part in gradient tracking
    pub requires_grad: bool,
    /// Id of the live tensor, used to look gradients up after backward
    pub source: Option<TensorId>,
}

impl CapturedTensor {
    /// Wrap a live tensor without copying it
    pub fn live(tensor: &Tensor) -> Self {
        Self {
            value: tensor.clone(),
            requires_grad: tensor.is_variable() || tensor.track_op(),
            source: Some(tensor.id()),
        }
    }

    /// Wrap a live tensor whose gradient is collected under another id
    pub fn tapped(tensor: &Tensor, source: TensorId) -> Self {
        Self {
            value: tensor.clone(),
            requires_grad: true,
            source: Some(source),
        }
    }

    /// Deep copy of the value, detached from the computation graph
    pub fn capture(&self) -> Result<Self> {
        Ok(Self {
            value: self.value.copy()?.detach(),
            requires_grad: self.requires_grad,
            source: self.source,
        })
    }
}

/// Nested container of tensors
#[derive(Debug, Clone, Default)]
pub enum TensorTree {
    /// No value (e.g. an optional argument that was not passed)
    #[default]
    None,
    /// A single tensor
    Leaf(CapturedTensor),
    /// Fixed-size positional group
    Tuple(Vec<TensorTree>),
    /// Variable-size sequence
    List(Vec<TensorTree>),
    /// Named entries, in insertion order
    Map(Vec<(String, TensorTree)>),
}

impl TensorTree {
    /// Leaf referencing a live tensor
    pub fn leaf(tensor: &Tensor) -> Self {
        Self::Leaf(CapturedTensor::live(tensor))
    }

    /// Tuple of live tensors
    pub fn tuple<'a, I: IntoIterator<Item = &'a Tensor>>(tensors: I) -> Self {
        Self::Tuple(tensors.into_iter().map(Self::leaf).collect())
    }

    /// List of live tensors
    pub fn list<'a, I: IntoIterator<Item = &'a Tensor>>(tensors: I) -> Self {
        Self::List(tensors.into_iter().map(Self::leaf).collect())
    }

    /// Deep-clone every leaf, preserving the container structure
    pub fn capture(&self) -> Result<Self> {
        Ok(match self {
            Self::None => Self::None,
            Self::Leaf(t) => Self::Leaf(t.capture()?),
            Self::Tuple(items) => Self::Tuple(capture_all(items)?),
            Self::List(items) => Self::List(capture_all(items)?),
            Self::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.capture()?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }

    /// All leaves in depth-first order
    pub fn leaves(&self) -> Vec<&CapturedTensor> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    /// Leaves that carry gradients, in depth-first order
    pub fn grad_leaves(&self) -> Vec<&CapturedTensor> {
        self.leaves().into_iter().filter(|t| t.requires_grad).collect()
    }

    /// Flattened tensor values
    pub fn tensors(&self) -> Vec<&Tensor> {
        self.leaves().into_iter().map(|t| &t.value).collect()
    }

    /// Number of leaves
    pub fn num_leaves(&self) -> usize {
        self.leaves().len()
    }

    /// True if both trees have the same containers, keys and leaf positions
    pub fn same_structure(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::Leaf(_), Self::Leaf(_)) => true,
            (Self::Tuple(a), Self::Tuple(b)) | (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_structure(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same_structure(vb))
            }
            _ => false,
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a CapturedTensor>) {
        match self {
            Self::None => {}
            Self::Leaf(t) => out.push(t),
            Self::Tuple(items) | Self::List(items) => {
                for item in items {
                    item.collect_leaves(out);
                }
            }
            Self::Map(entries) => {
                for (_, v) in entries {
                    v.collect_leaves(out);
                }
            }
        }
    }
}

fn capture_all(items: &[TensorTree]) -> Result<Vec<TensorTree>> {
    items.iter().map(TensorTree::capture).collect()
}

impl From<&Tensor> for TensorTree {
    fn from(tensor: &Tensor) -> Self {
        Self::leaf(tensor)
    }
}

impl From<Tensor> for TensorTree {
    fn from(tensor: Tensor) -> Self {
        Self::leaf(&tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    #[test]
    fn test_capture_is_isomorphic() {
        let dev = Device::Cpu;
        let a = Tensor::new(&[1f32, 2.0], &dev).unwrap();
        let b = Tensor::new(&[[3f32]], &dev).unwrap();
        let tree = TensorTree::Tuple(vec![
            TensorTree::leaf(&a),
            TensorTree::Map(vec![
                ("mask".to_string(), TensorTree::None),
                ("bias".to_string(), TensorTree::list([&b])),
            ]),
        ]);

        let captured = tree.capture().unwrap();
        assert!(captured.same_structure(&tree));
        assert_eq!(captured.num_leaves(), 2);
        let values: Vec<Vec<f32>> = captured
            .tensors()
            .iter()
            .map(|t| t.flatten_all().unwrap().to_vec1().unwrap())
            .collect();
        assert_eq!(values, vec![vec![1.0, 2.0], vec![3.0]]);
    }

    #[test]
    fn test_capture_survives_in_place_update() {
        let dev = Device::Cpu;
        let var = Var::new(&[1f32, 2.0, 3.0], &dev).unwrap();
        let captured = TensorTree::leaf(var.as_tensor()).capture().unwrap();

        var.set(&Tensor::new(&[9f32, 9.0, 9.0], &dev).unwrap()).unwrap();

        let live: Vec<f32> = var.as_tensor().to_vec1().unwrap();
        let snap: Vec<f32> = captured.tensors()[0].to_vec1().unwrap();
        assert_eq!(live, vec![9.0, 9.0, 9.0]);
        assert_eq!(snap, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_grad_leaves_follow_variables() {
        let dev = Device::Cpu;
        let var = Var::new(&[1f32], &dev).unwrap();
        let plain = Tensor::new(&[2f32], &dev).unwrap();
        let tree = TensorTree::tuple([var.as_tensor(), &plain]);

        let captured = tree.capture().unwrap();
        let grads = captured.grad_leaves();
        assert_eq!(grads.len(), 1);
        assert_eq!(grads[0].source, Some(var.as_tensor().id()));
        assert!(!captured.leaves()[0].value.is_variable());
    }

    #[test]
    fn test_structure_mismatch() {
        let dev = Device::Cpu;
        let a = Tensor::new(&[1f32], &dev).unwrap();
        let tuple = TensorTree::tuple([&a]);
        let list = TensorTree::list([&a]);
        assert!(!tuple.same_structure(&list));
        assert!(!tuple.same_structure(&TensorTree::None));
    }
}
