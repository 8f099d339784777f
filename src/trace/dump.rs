//! Saving and loading reports
//!
//! A dump is a directory holding `report.yaml` (item metadata and the
//! layout of every captured structure) and `tensors.safetensors` (the
//! captured tensors, keyed from the metadata). The two model runs can then
//! happen in separate processes and be compared later.

use candle_core::{safetensors, Device, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::item::{ItemId, ItemKind, LayerRef, ReportItem};
use super::report::Report;
use super::stack::Frame;
use crate::error::{Result, TraceError};
use crate::tensor::{CapturedTensor, TensorTree};

/// Metadata file name inside a dump directory
pub const META_FILE: &str = "report.yaml";
/// Tensor file name inside a dump directory
pub const TENSOR_FILE: &str = "tensors.safetensors";

#[derive(Debug, Serialize, Deserialize)]
struct ReportMeta {
    name: String,
    items: Vec<ItemMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ItemMeta {
    kind: ItemKind,
    step: usize,
    layer: LayerRef,
    structural_id: usize,
    frame_info: Frame,
    #[serde(default)]
    frames: Vec<Frame>,
    #[serde(default)]
    forward_link: Option<ItemId>,
    #[serde(default)]
    backward_link: Option<ItemId>,
    input: TreeLayout,
    output: TreeLayout,
    #[serde(default)]
    input_grads: Vec<Option<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TreeLayout {
    None,
    Leaf { key: String, requires_grad: bool },
    Tuple { items: Vec<TreeLayout> },
    List { items: Vec<TreeLayout> },
    Map { entries: Vec<(String, TreeLayout)> },
}

/// Collects tensors under generated keys while writing layouts
struct TensorSink<'a> {
    prefix: String,
    next: usize,
    tensors: &'a mut HashMap<String, Tensor>,
}

impl<'a> TensorSink<'a> {
    fn new(tensors: &'a mut HashMap<String, Tensor>, id: ItemId, part: &str) -> Self {
        Self {
            prefix: format!("item{}.{}", id.0, part),
            next: 0,
            tensors,
        }
    }

    fn put(&mut self, tensor: &Tensor) -> Result<String> {
        let key = format!("{}.{}", self.prefix, self.next);
        self.next += 1;
        self.tensors.insert(key.clone(), tensor.contiguous()?);
        Ok(key)
    }

    fn layout(&mut self, tree: &TensorTree) -> Result<TreeLayout> {
        Ok(match tree {
            TensorTree::None => TreeLayout::None,
            TensorTree::Leaf(t) => TreeLayout::Leaf {
                key: self.put(&t.value)?,
                requires_grad: t.requires_grad,
            },
            TensorTree::Tuple(items) => TreeLayout::Tuple {
                items: items.iter().map(|i| self.layout(i)).collect::<Result<_>>()?,
            },
            TensorTree::List(items) => TreeLayout::List {
                items: items.iter().map(|i| self.layout(i)).collect::<Result<_>>()?,
            },
            TensorTree::Map(entries) => TreeLayout::Map {
                entries: entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.layout(v)?)))
                    .collect::<Result<_>>()?,
            },
        })
    }
}

fn take_tensor(tensors: &mut HashMap<String, Tensor>, key: &str) -> Result<Tensor> {
    tensors
        .remove(key)
        .ok_or_else(|| TraceError::Dump(format!("tensor `{}` missing from {}", key, TENSOR_FILE)))
}

fn rebuild(layout: &TreeLayout, tensors: &mut HashMap<String, Tensor>) -> Result<TensorTree> {
    let rebuild_all = |items: &[TreeLayout], tensors: &mut HashMap<String, Tensor>| {
        items
            .iter()
            .map(|i| rebuild(i, tensors))
            .collect::<Result<Vec<_>>>()
    };
    Ok(match layout {
        TreeLayout::None => TensorTree::None,
        TreeLayout::Leaf { key, requires_grad } => TensorTree::Leaf(CapturedTensor {
            value: take_tensor(tensors, key)?,
            requires_grad: *requires_grad,
            source: None,
        }),
        TreeLayout::Tuple { items } => TensorTree::Tuple(rebuild_all(items, tensors)?),
        TreeLayout::List { items } => TensorTree::List(rebuild_all(items, tensors)?),
        TreeLayout::Map { entries } => TensorTree::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), rebuild(v, tensors)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

impl Report {
    /// Write the report into directory `dir`, creating it if needed
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut tensors = HashMap::new();
        let mut items = Vec::with_capacity(self.len());
        for (id, item) in self.iter() {
            let input = TensorSink::new(&mut tensors, id, "input").layout(item.input())?;
            let output = TensorSink::new(&mut tensors, id, "output").layout(item.output())?;
            let mut grads = TensorSink::new(&mut tensors, id, "grad");
            let input_grads = item
                .input_grads()
                .iter()
                .map(|g| g.as_ref().map(|t| grads.put(t)).transpose())
                .collect::<Result<Vec<_>>>()?;

            items.push(ItemMeta {
                kind: item.kind(),
                step: item.step(),
                layer: item.layer().clone(),
                structural_id: item.structural_id(),
                frame_info: item.frame_info().clone(),
                frames: item.stacks().to_vec(),
                forward_link: item.forward_link(),
                backward_link: item.backward_link(),
                input,
                output,
                input_grads,
            });
        }

        let meta = ReportMeta {
            name: self.name().to_string(),
            items,
        };
        std::fs::write(dir.join(META_FILE), serde_yaml::to_string(&meta)?)?;
        if !tensors.is_empty() {
            safetensors::save(&tensors, dir.join(TENSOR_FILE))?;
        }

        info!(report = %self.name(), items = self.len(), tensors = tensors.len(), "saved dump to {:?}", dir);
        Ok(())
    }

    /// Read a report written by [`Report::save`]
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let meta: ReportMeta = serde_yaml::from_str(&std::fs::read_to_string(dir.join(META_FILE))?)?;

        let tensor_path = dir.join(TENSOR_FILE);
        let mut tensors = if tensor_path.exists() {
            safetensors::load(&tensor_path, &Device::Cpu)?
        } else {
            HashMap::new()
        };

        let count = meta.items.len();
        let mut report = Report::new(meta.name);
        let mut forward_links = Vec::new();
        let mut backward_links = Vec::with_capacity(count);
        for (idx, m) in meta.items.into_iter().enumerate() {
            for link in m.forward_link.iter().chain(m.backward_link.iter()) {
                if link.0 >= count {
                    return Err(TraceError::Dump(format!(
                        "item {} links to missing item {}",
                        idx, link.0
                    )));
                }
            }

            let input = rebuild(&m.input, &mut tensors)?;
            let output = rebuild(&m.output, &mut tensors)?;
            let grads = m
                .input_grads
                .iter()
                .map(|k| k.as_deref().map(|k| take_tensor(&mut tensors, k)).transpose())
                .collect::<Result<Vec<_>>>()?;

            let mut item = ReportItem::new(
                m.kind,
                m.step,
                &input,
                &output,
                m.layer,
                m.structural_id,
                m.frame_info,
                m.frames,
            )?;
            if m.kind == ItemKind::Backward {
                if grads.len() != item.input_grads().len() {
                    return Err(TraceError::Dump(format!(
                        "item {} has {} grad slots, input has {} grad-bearing tensors",
                        idx,
                        grads.len(),
                        item.input_grads().len()
                    )));
                }
                item = item.with_grads(grads);
            }
            if let Some(fwd) = m.forward_link {
                forward_links.push((ItemId(idx), fwd));
            }
            backward_links.push(m.backward_link);
            report.push(item);
        }

        // relinking through set_forward checks kinds, order and uniqueness
        for (bwd, fwd) in forward_links {
            report.set_forward(bwd, fwd)?;
        }
        for (idx, expected) in backward_links.into_iter().enumerate() {
            if report.items()[idx].backward_link() != expected {
                return Err(TraceError::Dump(format!(
                    "item {} has a backward link that its backward item does not confirm",
                    idx
                )));
            }
        }

        info!(report = %report.name(), items = report.len(), "loaded dump from {:?}", dir);
        Ok(report)
    }
}
