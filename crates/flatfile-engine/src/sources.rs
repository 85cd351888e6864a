use crate::{EngineError, Result};
use flatfile_model::SourceRecord;

/// Ordered record of the sources attached to one workbook, keyed by their
/// caller-supplied logical path.
#[derive(Debug, Default)]
pub struct SourceTable {
    entries: Vec<SourceRecord>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }

    /// Append a source; logical paths are unique within a workbook.
    pub fn attach(&mut self, record: SourceRecord) -> Result<()> {
        if self.contains(&record.path) {
            return Err(EngineError::DuplicateSource(record.path));
        }
        self.entries.push(record);
        Ok(())
    }

    /// Remove and return the source at `path`, with the dataset keys it owns.
    pub fn detach(&mut self, path: &str) -> Result<SourceRecord> {
        let idx = self
            .entries
            .iter()
            .position(|entry| entry.path == path)
            .ok_or_else(|| EngineError::UnknownSource(path.to_string()))?;
        Ok(self.entries.remove(idx))
    }

    pub fn get(&self, path: &str) -> Option<&SourceRecord> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut SourceRecord> {
        self.entries.iter_mut().find(|entry| entry.path == path)
    }

    /// Logical paths in insertion order.
    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.path.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the recorded ingestion-buffer sizes.
    pub fn total_buffer_bytes(&self) -> u64 {
        self.entries.iter().map(|entry| entry.approx_buffer_bytes).sum()
    }

    pub fn first(&self) -> Option<&SourceRecord> {
        self.entries.first()
    }
}
