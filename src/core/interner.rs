use std::collections::HashMap;

/// Maps subject labels to dense `u32` ids for the lifetime of one graph window.
///
/// Ids index straight into the arena's bucket vector, so a nested reference is
/// resolved by lookup rather than by holding a pointer into another bucket.
#[derive(Debug, Default)]
pub struct Interner {
    label_to_id: HashMap<String, u32>,
    id_to_label: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, label: &str) -> u32 {
        if let Some(&id) = self.label_to_id.get(label) {
            id
        } else {
            let id = self.id_to_label.len() as u32;
            self.label_to_id.insert(label.to_string(), id);
            self.id_to_label.push(label.to_string());
            id
        }
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.label_to_id.get(label).copied()
    }

    pub fn resolve(&self, id: u32) -> Option<&str> {
        self.id_to_label.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.id_to_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_label.is_empty()
    }

    /// Forget every label but keep the allocations for the next window.
    pub fn clear(&mut self) {
        self.label_to_id.clear();
        self.id_to_label.clear();
    }
}
