// sink.rs — Where verdict records go.
//
// The recorder only knows the LogSink trait. RollingAuditLog (log.rs) is the
// durable reference sink; MemorySink keeps a bounded window in memory for
// embedding callers and tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::AuditError;
use crate::record::VerdictRecord;

/// Destination for verdict records.
pub trait LogSink {
    /// Persist one record. The sink may fill in `previous_hash`.
    fn append(&mut self, record: &mut VerdictRecord) -> Result<(), AuditError>;
}

/// Bounded in-memory sink. Clones share the same window.
#[derive(Debug, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<VecDeque<VerdictRecord>>>,
    retention: usize,
}

impl MemorySink {
    pub fn new(retention: usize) -> Result<Self, AuditError> {
        if retention == 0 {
            return Err(AuditError::InvalidRetention);
        }
        Ok(Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(retention))),
            retention,
        })
    }

    /// Copy of the retained records, oldest first.
    pub fn snapshot(&self) -> Vec<VerdictRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn append(&mut self, record: &mut VerdictRecord) -> Result<(), AuditError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push_back(record.clone());
        while records.len() > self.retention {
            records.pop_front();
        }
        Ok(())
    }
}
