use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// String interning service.
///
/// Bulk build data (test names, statuses, problem types) repeats the same
/// strings over and over; compacted records keep integer ids instead.
pub trait StringCompactor: Send + Sync {
    /// Id of an already interned string.
    fn string_id(&self, value: &str) -> Option<i32>;

    /// Interns the string if needed and returns its id.
    fn get_or_create_id(&self, value: &str) -> i32;

    fn string_from_id(&self, id: i32) -> Option<String>;
}

#[derive(Default)]
struct Interned {
    ids: HashMap<String, i32>,
    values: Vec<String>,
}

/// Process-local interning table.
#[derive(Default)]
pub struct InMemoryCompactor {
    inner: Mutex<Interned>,
}

impl InMemoryCompactor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StringCompactor for InMemoryCompactor {
    fn string_id(&self, value: &str) -> Option<i32> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.ids.get(value).copied()
    }

    fn get_or_create_id(&self, value: &str) -> i32 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = inner.ids.get(value) {
            return *id;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let id = inner.values.len() as i32;
        inner.values.push(value.to_string());
        inner.ids.insert(value.to_string(), id);
        id
    }

    fn string_from_id(&self, id: i32) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        usize::try_from(id)
            .ok()
            .and_then(|idx| inner.values.get(idx))
            .cloned()
    }
}
