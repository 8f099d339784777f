//! Lookup of comparison actions by layer type pair

use std::collections::HashMap;
use tracing::debug;

use super::{Action, EqualAction};
use crate::error::{Result, TraceError};
use crate::trace::LayerRef;

/// Layer types compared with [`EqualAction`] by [`ActionRegistry::standard`]
pub const STANDARD_LAYERS: &[&str] = &[
    "Linear",
    "Conv1d",
    "Conv2d",
    "ConvTranspose1d",
    "ConvTranspose2d",
    "Embedding",
    "LayerNorm",
    "RmsNorm",
    "BatchNorm",
    "GroupNorm",
    "Activation",
    "Sequential",
];

/// Actions keyed by (reference type, candidate type)
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<(String, String), Box<dyn Action>>,
    fallback: Option<Box<dyn Action>>,
}

impl ActionRegistry {
    /// Empty registry; every lookup fails until actions are registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry comparing the common candle layers with [`EqualAction`]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for layer in STANDARD_LAYERS {
            registry.register_same(*layer, EqualAction);
        }
        registry
    }

    /// Register `action` for a reference/candidate type pair
    pub fn register<A: Action + 'static>(
        &mut self,
        reference: impl Into<String>,
        candidate: impl Into<String>,
        action: A,
    ) -> &mut Self {
        self.actions
            .insert((reference.into(), candidate.into()), Box::new(action));
        self
    }

    /// Register `action` for two layers of the same type
    pub fn register_same<A: Action + 'static>(
        &mut self,
        type_name: impl Into<String>,
        action: A,
    ) -> &mut Self {
        let type_name = type_name.into();
        self.register(type_name.clone(), type_name, action)
    }

    /// Use `action` for every pair without a registered entry
    pub fn with_fallback<A: Action + 'static>(mut self, action: A) -> Self {
        self.fallback = Some(Box::new(action));
        self
    }

    /// Number of registered pairs
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if no pair is registered
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Action for comparing `reference` with `candidate`
    pub fn get_action(&self, reference: &LayerRef, candidate: &LayerRef) -> Result<&dyn Action> {
        let key = (reference.type_name.clone(), candidate.type_name.clone());
        let action = self
            .actions
            .get(&key)
            .or(self.fallback.as_ref())
            .ok_or(TraceError::NoAction(key.0.clone(), key.1.clone()))?;
        debug!(
            reference = %key.0,
            candidate = %key.1,
            action = action.name(),
            "resolved action"
        );
        Ok(&**action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompareConfig;
    use crate::trace::ReportItem;

    fn noop(_: &ReportItem, _: &ReportItem, _: &CompareConfig) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_unregistered_pair_fails() {
        let registry = ActionRegistry::new();
        let err = registry
            .get_action(&LayerRef::new("Linear", "a"), &LayerRef::new("Linear", "b"))
            .err()
            .unwrap();
        assert!(matches!(err, TraceError::NoAction(ref a, ref b) if a == "Linear" && b == "Linear"));
    }

    #[test]
    fn test_standard_registry() {
        let registry = ActionRegistry::standard();
        assert_eq!(registry.len(), STANDARD_LAYERS.len());
        let action = registry
            .get_action(&LayerRef::new("Conv2d", "a"), &LayerRef::new("Conv2d", "b"))
            .unwrap();
        assert_eq!(action.name(), "equal");
        assert!(registry
            .get_action(&LayerRef::new("Conv2d", "a"), &LayerRef::new("Linear", "b"))
            .is_err());
    }

    #[test]
    fn test_cross_type_pair_and_fallback() {
        let mut registry = ActionRegistry::new();
        registry.register("Linear", "Dense", EqualAction);
        let registry = registry.with_fallback(noop);

        let cross = registry
            .get_action(&LayerRef::new("Linear", "a"), &LayerRef::new("Dense", "b"))
            .unwrap();
        assert_eq!(cross.name(), "equal");

        let other = registry
            .get_action(&LayerRef::new("Mystery", "a"), &LayerRef::new("Thing", "b"))
            .unwrap();
        assert_eq!(other.name(), "custom");
    }
}
