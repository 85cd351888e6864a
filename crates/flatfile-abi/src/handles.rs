//! Process-wide workbook handle table with LRU eviction.

use crate::lock_unpoisoned;
use flatfile_engine::EngineContext;
use std::collections::HashMap;
use std::ffi::CString;
use std::sync::{Arc, Mutex};

/// Resident-set bounds for the handle table.
#[derive(Clone, Copy, Debug)]
pub struct HandleConfig {
    /// Workbooks kept resident at once.
    pub max_active_workbooks: usize,
    /// Total approximate bytes across all resident workbooks.
    pub max_resident_bytes: u64,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            max_active_workbooks: 4,
            max_resident_bytes: 256 * 1024 * 1024,
        }
    }
}

/// One resident workbook plus its per-workbook string arena.
///
/// The arena holds the last JSON response and last error; a pointer handed to
/// a caller stays valid until the next operation on the same handle
/// overwrites the slot.
pub(crate) struct WorkbookSlot {
    pub(crate) context: EngineContext,
    last_json: CString,
    last_error: CString,
    pub(crate) last_used_at: u64,
    #[allow(dead_code)]
    pub(crate) created_at: u64,
}

impl WorkbookSlot {
    /// Store a JSON payload in the arena and return its NUL-terminated text.
    pub(crate) fn set_json(&mut self, payload: &str) -> &CString {
        self.last_json = to_cstring(payload);
        &self.last_json
    }

    pub(crate) fn set_error(&mut self, message: &str) -> &CString {
        self.last_error = to_cstring(message);
        &self.last_error
    }
}

/// Interior NUL bytes cannot cross a C boundary; replace them.
fn to_cstring(text: &str) -> CString {
    CString::new(text).unwrap_or_else(|_| {
        let cleaned: String = text.chars().filter(|c| *c != '\0').collect();
        CString::new(cleaned).unwrap_or_default()
    })
}

struct ManagerState {
    workbooks: HashMap<u64, Arc<Mutex<WorkbookSlot>>>,
    /// Handle ids are monotonic and never reused, so callers can tell an
    /// evicted handle apart from a fresh workbook.
    next_handle: u64,
    /// Logical clock; bumped on every touch.
    clock: u64,
    config: HandleConfig,
    // Process-level mirrors backing the handle-less getters.
    last_error: CString,
    last_json: CString,
}

/// Owner of every resident workbook.
pub struct HandleManager {
    state: Mutex<ManagerState>,
}

impl Default for HandleManager {
    fn default() -> Self {
        Self::new(HandleConfig::default())
    }
}

impl HandleManager {
    pub fn new(config: HandleConfig) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                workbooks: HashMap::new(),
                next_handle: 1,
                clock: 0,
                config,
                last_error: CString::default(),
                last_json: CString::default(),
            }),
        }
    }

    /// Register a freshly opened workbook and return its handle.
    pub(crate) fn insert(&self, context: EngineContext) -> u64 {
        let mut state = lock_unpoisoned(&self.state);
        state.clock += 1;
        let now = state.clock;
        let handle = state.next_handle;
        state.next_handle += 1;
        state.workbooks.insert(
            handle,
            Arc::new(Mutex::new(WorkbookSlot {
                context,
                last_json: CString::default(),
                last_error: CString::default(),
                last_used_at: now,
                created_at: now,
            })),
        );
        handle
    }

    /// Resolve a handle, stamping it as most recently used.
    pub(crate) fn touch(&self, handle: u64) -> Option<Arc<Mutex<WorkbookSlot>>> {
        let mut state = lock_unpoisoned(&self.state);
        state.clock += 1;
        let now = state.clock;
        let slot = state.workbooks.get(&handle)?.clone();
        lock_unpoisoned(&slot).last_used_at = now;
        Some(slot)
    }

    /// Close a workbook; idempotent.
    pub(crate) fn remove(&self, handle: u64) {
        let mut state = lock_unpoisoned(&self.state);
        state.workbooks.remove(&handle);
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.state).workbooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: u64) -> bool {
        lock_unpoisoned(&self.state).workbooks.contains_key(&handle)
    }

    /// Evict least-recently-used workbooks until both resident bounds hold or
    /// only one workbook remains. `protected` (the handle the current call
    /// just created or touched) is never evicted here.
    pub(crate) fn enforce_limits(&self, protected: u64) {
        loop {
            let victim = {
                let state = lock_unpoisoned(&self.state);
                if state.workbooks.len() <= 1 {
                    return;
                }
                let over = state.workbooks.len() > state.config.max_active_workbooks
                    || self.resident_bytes(&state) > state.config.max_resident_bytes;
                if !over {
                    return;
                }
                state
                    .workbooks
                    .iter()
                    .filter(|(handle, _)| **handle != protected)
                    .min_by_key(|(_, slot)| lock_unpoisoned(slot).last_used_at)
                    .map(|(handle, _)| *handle)
            };
            let Some(victim) = victim else {
                return;
            };
            log::warn!("evicting workbook handle {victim} to stay within resident bounds");
            self.remove(victim);
        }
    }

    fn resident_bytes(&self, state: &ManagerState) -> u64 {
        state
            .workbooks
            .values()
            .map(|slot| lock_unpoisoned(slot).context.approx_total_bytes())
            .sum()
    }

    /// Update the process-level mirrors returned by the handle-less getters.
    pub(crate) fn set_last_results(&self, error: Option<&str>, json: &str) {
        let mut state = lock_unpoisoned(&self.state);
        state.last_error = to_cstring(error.unwrap_or(""));
        state.last_json = to_cstring(json);
    }

    pub(crate) fn last_error_ptr(&self) -> *const std::ffi::c_char {
        lock_unpoisoned(&self.state).last_error.as_ptr()
    }

    pub(crate) fn last_json_ptr(&self) -> *const std::ffi::c_char {
        lock_unpoisoned(&self.state).last_json.as_ptr()
    }
}
