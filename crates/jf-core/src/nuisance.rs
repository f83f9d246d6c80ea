//! Nuisance-parameter bookkeeping.
//!
//! A [`NuisanceRegistry`] assigns a stable zero-based slot to each named
//! nuisance parameter. The slot order defines the layout of the nuisance
//! block of the fit parameter vector, so every loss contributor attached to
//! the same registry agrees on indices. Nuisances are only ever added during
//! session setup; there is no removal.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Ordered registry of named nuisance-parameter slots.
#[derive(Debug, Clone, Default)]
pub struct NuisanceRegistry {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl NuisanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a nuisance parameter and return its slot index.
    ///
    /// Registration is idempotent: registering an already-known name returns
    /// the existing slot without changing the registry.
    pub fn register(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), idx);
        idx
    }

    /// Number of registered nuisance parameters.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no nuisance parameters are registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name at the given slot index.
    pub fn name_at(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    /// Slot index of a registered name.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| Error::UnknownNuisance(name.to_owned()))
    }

    /// Registered names in slot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Borrowed view of nuisance values laid out per a [`NuisanceRegistry`].
///
/// Loss contributors read nuisance values through this view at evaluation
/// time; the view never owns the values, so building one per evaluation is
/// free.
#[derive(Debug, Clone, Copy)]
pub struct NuisanceView<'a> {
    registry: &'a NuisanceRegistry,
    values: &'a [f64],
}

impl<'a> NuisanceView<'a> {
    /// Create a view over `values`, which must have one entry per registered
    /// nuisance.
    pub fn new(registry: &'a NuisanceRegistry, values: &'a [f64]) -> Result<Self> {
        if values.len() != registry.len() {
            return Err(Error::Validation(format!(
                "nuisance vector length {} != registry size {}",
                values.len(),
                registry.len()
            )));
        }
        Ok(Self { registry, values })
    }

    /// Value at a slot index.
    pub fn value(&self, idx: usize) -> f64 {
        self.values[idx]
    }

    /// Value looked up by name.
    pub fn get(&self, name: &str) -> Result<f64> {
        Ok(self.values[self.registry.index_of(name)?])
    }

    /// Number of nuisance values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The registry this view is laid out against.
    pub fn registry(&self) -> &NuisanceRegistry {
        self.registry
    }
}
