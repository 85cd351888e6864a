use crate::{EngineError, Result};
use flatfile_model::DatasetDescriptor;

/// Mapping from current technical name to dataset metadata, preserving
/// registration order. Technical names are unique and case-sensitive.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    entries: Vec<DatasetDescriptor>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|d| d.technical_name == name)
    }

    pub fn get(&self, name: &str) -> Option<&DatasetDescriptor> {
        self.entries.iter().find(|d| d.technical_name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DatasetDescriptor> {
        self.entries.iter_mut().find(|d| d.technical_name == name)
    }

    /// Insert a freshly imported dataset (`technical_name == default_name`).
    pub fn register(&mut self, descriptor: DatasetDescriptor) -> Result<()> {
        if self.contains(&descriptor.technical_name) {
            return Err(EngineError::DuplicateDataset(descriptor.technical_name));
        }
        self.entries.push(descriptor);
        Ok(())
    }

    /// Update the registry side of a rename. The caller is responsible for
    /// renaming the backing store object first; this only flips the key.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if self.contains(new) {
            return Err(EngineError::DuplicateDataset(new.to_string()));
        }
        let entry = self
            .get_mut(old)
            .ok_or_else(|| EngineError::UnknownDataset(old.to_string()))?;
        entry.technical_name = new.to_string();
        Ok(())
    }

    /// Remove every dataset owned by `source_path`, in registration order.
    pub fn detach_by_source(&mut self, source_path: &str) -> Vec<DatasetDescriptor> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            if entry.source_path == source_path {
                removed.push(entry.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
