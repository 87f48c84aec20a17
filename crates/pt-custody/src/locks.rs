//! Per-batch operation locks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Hands out one mutex per batch identifier.
///
/// Two concurrent transitions on the same batch serialize; distinct
/// batches proceed fully in parallel. Entries are never reclaimed, which
/// is fine at the scale of one lock per tracked batch.
#[derive(Default)]
pub(crate) struct BatchLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BatchLocks {
    pub fn acquire(&self, batch_no: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock();
        Arc::clone(locks.entry(batch_no.to_string()).or_default())
    }
}
