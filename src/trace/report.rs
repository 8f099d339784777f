//! Ordered collection of recorded items for one model run

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use super::counter::next_step;
use super::item::{ItemId, ItemKind, LayerRef, ReportItem};
use super::stack::Frame;
use crate::error::{Result, TraceError};
use crate::tensor::TensorTree;

/// Report shared between a session and the code recording into it
pub type SharedReport = Rc<RefCell<Report>>;

/// All items recorded during one traced run
#[derive(Debug, Clone, Default)]
pub struct Report {
    name: String,
    items: Vec<ReportItem>,
}

impl Report {
    /// Create an empty report
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Create an empty report ready to be bound with `report_guard`
    pub fn shared(name: impl Into<String>) -> SharedReport {
        Rc::new(RefCell::new(Self::new(name)))
    }

    /// Session label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one invocation with the next step id of the session counter
    #[allow(clippy::too_many_arguments)]
    pub fn put_item(
        &mut self,
        kind: ItemKind,
        input: &TensorTree,
        output: &TensorTree,
        layer: LayerRef,
        structural_id: usize,
        frame_info: Frame,
        frames: Vec<Frame>,
    ) -> Result<ItemId> {
        let step = next_step();
        let item = ReportItem::new(
            kind,
            step,
            input,
            output,
            layer,
            structural_id,
            frame_info,
            frames,
        )?;
        debug!(
            report = %self.name,
            step,
            kind = %kind,
            layer = %item.layer().type_name,
            structural_id,
            "recorded item"
        );
        Ok(self.push(item))
    }

    pub(crate) fn push(&mut self, item: ReportItem) -> ItemId {
        self.items.push(item);
        ItemId(self.items.len() - 1)
    }

    /// Link a backward item to the forward item it differentiates
    ///
    /// Each item is linked at most once, and the forward item must have
    /// been recorded first.
    pub fn set_forward(&mut self, backward: ItemId, forward: ItemId) -> Result<()> {
        let bwd = self.item(backward)?;
        if bwd.kind() != ItemKind::Backward {
            return Err(TraceError::NotBackward(bwd.step()));
        }
        let fwd = self.item(forward)?;
        if fwd.kind() != ItemKind::Forward {
            return Err(TraceError::NotForward(fwd.step()));
        }
        if fwd.step() >= bwd.step() {
            return Err(TraceError::LinkOrder {
                forward: fwd.step(),
                backward: bwd.step(),
            });
        }
        if bwd.forward_link().is_some() {
            return Err(TraceError::AlreadyLinked(bwd.step()));
        }
        if fwd.backward_link().is_some() {
            return Err(TraceError::AlreadyLinked(fwd.step()));
        }

        self.items[forward.0].backward_link = Some(backward);
        self.items[backward.0].forward_link = Some(forward);
        Ok(())
    }

    /// Item by handle
    pub fn item(&self, id: ItemId) -> Result<&ReportItem> {
        self.items.get(id.0).ok_or(TraceError::UnknownItem(id))
    }

    /// Mutable item by handle, e.g. to fill gradients
    pub fn item_mut(&mut self, id: ItemId) -> Result<&mut ReportItem> {
        self.items.get_mut(id.0).ok_or(TraceError::UnknownItem(id))
    }

    /// Forward items in step order
    pub fn get_fwd_items(&self) -> Vec<&ReportItem> {
        self.items_of(ItemKind::Forward)
    }

    /// Backward items in step order
    pub fn get_bwd_items(&self) -> Vec<&ReportItem> {
        self.items_of(ItemKind::Backward)
    }

    /// Handles of forward items in step order
    pub fn fwd_ids(&self) -> Vec<ItemId> {
        self.iter()
            .filter(|(_, item)| item.kind() == ItemKind::Forward)
            .map(|(id, _)| id)
            .collect()
    }

    fn items_of(&self, kind: ItemKind) -> Vec<&ReportItem> {
        let mut items: Vec<&ReportItem> = self.items.iter().filter(|i| i.kind() == kind).collect();
        items.sort_by_key(|i| i.step());
        items
    }

    /// Items with their handles, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &ReportItem)> {
        self.items.iter().enumerate().map(|(i, item)| (ItemId(i), item))
    }

    /// All items in insertion order
    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Report name is: {}", self.name)?;
        for item in &self.items {
            write!(f, "\n    {}: [{}]", item.step(), item.layer().type_name)?;
        }
        Ok(())
    }
}
