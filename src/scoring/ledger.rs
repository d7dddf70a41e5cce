use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bincode;
use serde::{Deserialize, Serialize};

use crate::scoring::tally::DomainTally;
use crate::{Error, Result};

/// Per-file partial aggregate built by one worker before merging.
pub type PartialTallies = HashMap<String, DomainTally>;

/// Shared per-domain aggregate state.
///
/// The key index sits behind a read-write lock that is only taken for writing
/// when a new domain appears; each tally has its own mutex, so updates are
/// serialized per domain and never globally.
#[derive(Debug, Default)]
pub struct DomainLedger {
    entries: RwLock<HashMap<String, Arc<Mutex<DomainTally>>>>,
    sample_cap: usize,
}

/// Serialized form of a ledger, for merging runs over disjoint file sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub sample_cap: usize,
    pub tallies: BTreeMap<String, DomainTally>,
}

impl DomainLedger {
    pub fn new(sample_cap: usize) -> Self {
        Self { entries: RwLock::new(HashMap::new()), sample_cap }
    }

    fn slot(&self, domain: &str) -> Arc<Mutex<DomainTally>> {
        if let Some(slot) = self.entries.read().unwrap_or_else(PoisonError::into_inner).get(domain) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(domain.to_string()).or_default())
    }

    /// Makes sure the domain has an entry, even without any events.
    pub fn touch(&self, domain: &str) {
        self.slot(domain);
    }

    pub fn merge_tally(&self, domain: &str, tally: &DomainTally) {
        let slot = self.slot(domain);
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        current.merge(tally, self.sample_cap);
    }

    pub fn merge_partial(&self, partial: &PartialTallies) {
        for (domain, tally) in partial {
            self.merge_tally(domain, tally);
        }
    }

    pub fn get(&self, domain: &str) -> Option<DomainTally> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(domain).map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).contains_key(domain)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_cap(&self) -> usize {
        self.sample_cap
    }

    /// Ordered copy of every tally. Only meaningful after the completion barrier.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let tallies = entries
            .iter()
            .map(|(domain, slot)| (domain.clone(), slot.lock().unwrap_or_else(PoisonError::into_inner).clone()))
            .collect();
        LedgerSnapshot { sample_cap: self.sample_cap, tallies }
    }

    /// Folds a snapshot into this ledger.
    pub fn restore(&self, snapshot: &LedgerSnapshot) {
        for (domain, tally) in &snapshot.tallies {
            self.merge_tally(domain, tally);
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let encoded = bincode::serialize(&self.snapshot()).map_err(|e| Error::Snapshot(e.to_string()))?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let snapshot: LedgerSnapshot =
            bincode::deserialize(&buffer).map_err(|e| Error::Snapshot(e.to_string()))?;
        let ledger = Self::new(snapshot.sample_cap);
        ledger.restore(&snapshot);
        Ok(ledger)
    }
}
