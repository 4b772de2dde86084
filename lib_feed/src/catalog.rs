//! # Dataset Catalog
//!
//! The server advertises its datasets grouped by category, e.g.
//! `{"EEG": [{"filename": "a.csv", "path": "/d/a.csv"}]}`. The catalog keeps
//! that grouping in the order the server sent it and derives the 1-based
//! flattened view on demand, so indices can never drift from the groups.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FeedError, FeedResult};

/// One dataset as it appears on the wire inside a category list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Display name.
    pub filename: String,
    /// Server-side path used when selecting the dataset.
    pub path: String,
}

/// A selectable dataset with its position in the flattened catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub category: String,
    pub name: String,
    pub path: String,
    /// 1-based position in [`Catalog::flatten`].
    pub index: usize,
}

/// Category name -> ordered datasets, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    groups: Vec<(String, Vec<DatasetEntry>)>,
}

impl Catalog {
    /// Builds a catalog from already-grouped entries, keeping their order.
    ///
    /// Entries for a category that appears more than once are appended to the
    /// first occurrence.
    pub fn from_groups<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<DatasetEntry>)>,
        S: Into<String>,
    {
        let mut catalog = Catalog::default();
        for (category, entries) in groups {
            catalog.push_group(category.into(), entries);
        }
        catalog
    }

    /// Parses the `availableDatasets` object of an `init` message.
    ///
    /// # Errors
    /// Returns [`FeedError::Protocol`] if the value is not an object of arrays
    /// of `{filename, path}` records.
    pub fn from_value(value: &Value) -> FeedResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            FeedError::Protocol("availableDatasets must be an object of categories".to_string())
        })?;

        let mut catalog = Catalog::default();
        for (category, list) in object {
            let entries: Vec<DatasetEntry> = serde_json::from_value(list.clone()).map_err(|e| {
                FeedError::Protocol(format!("invalid dataset list for category '{}': {}", category, e))
            })?;
            catalog.push_group(category.clone(), entries);
        }
        Ok(catalog)
    }

    fn push_group(&mut self, category: String, entries: Vec<DatasetEntry>) {
        match self.groups.iter_mut().find(|(name, _)| *name == category) {
            Some((_, existing)) => existing.extend(entries),
            None => self.groups.push((category, entries)),
        }
    }

    /// Total number of datasets across all categories.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, entries)| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Category names in server order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    /// Datasets of one category, if the category exists.
    pub fn entries(&self, category: &str) -> Option<&[DatasetEntry]> {
        self.groups
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, entries)| entries.as_slice())
    }

    /// All datasets, category by category, numbered `1..=len()`.
    pub fn flatten(&self) -> Vec<DatasetDescriptor> {
        self.groups
            .iter()
            .flat_map(|(category, entries)| entries.iter().map(move |entry| (category, entry)))
            .enumerate()
            .map(|(i, (category, entry))| DatasetDescriptor {
                category: category.clone(),
                name: entry.filename.clone(),
                path: entry.path.clone(),
                index: i + 1,
            })
            .collect()
    }

    /// Looks up a dataset by its 1-based flattened index.
    pub fn get(&self, index: usize) -> Option<DatasetDescriptor> {
        if index == 0 {
            return None;
        }
        self.flatten().into_iter().nth(index - 1)
    }

    /// Rebuilds the grouping from a flattened list.
    pub fn regroup(flat: &[DatasetDescriptor]) -> Catalog {
        Catalog::from_groups(flat.iter().map(|d| {
            (
                d.category.clone(),
                vec![DatasetEntry { filename: d.name.clone(), path: d.path.clone() }],
            )
        }))
    }
}
