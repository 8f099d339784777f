//! Key-indexed lookup over recorded items

use std::collections::HashMap;

use crate::error::{Result, TraceError};

/// Values indexed by a `usize` key, each key present at most once
#[derive(Debug)]
pub struct TableView<T> {
    table: HashMap<usize, T>,
}

impl<T> TableView<T> {
    /// Index `items` by `key`; a repeated key is ambiguous and fails with
    /// `DuplicateId`
    pub fn new<I, F>(items: I, key: F) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> usize,
    {
        let mut table = HashMap::new();
        for item in items {
            let k = key(&item);
            if table.insert(k, item).is_some() {
                return Err(TraceError::DuplicateId(k));
            }
        }
        Ok(Self { table })
    }

    /// Value stored under `key`
    pub fn get(&self, key: usize) -> Option<&T> {
        self.table.get(&key)
    }

    /// Check if `key` is present
    pub fn contains(&self, key: usize) -> bool {
        self.table.contains_key(&key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let view = TableView::new(vec![(3, "a"), (5, "b")], |x| x.0).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.get(5), Some(&(5, "b")));
        assert!(view.contains(3));
        assert!(view.get(4).is_none());
    }

    #[test]
    fn test_duplicate_key() {
        let err = TableView::new(vec![(1, "a"), (1, "b")], |x| x.0).unwrap_err();
        assert!(matches!(err, TraceError::DuplicateId(1)));
    }
}
