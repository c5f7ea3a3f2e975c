use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tracker::session::CompletedSession;

pub const DEFAULT_LEDGER_CAPACITY: usize = 100;

/// A finished session as kept in the local ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub session: CompletedSession,
    #[serde(default)]
    pub delivered: bool,
}

impl LedgerRecord {
    pub fn new(session: CompletedSession) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            delivered: false,
        }
    }
}

/// Ordered, bounded log of finished sessions, oldest first.
pub type Ledger = VecDeque<LedgerRecord>;

/// Appends `record` and evicts the oldest records until at most `capacity` remain. Returns the
/// evicted records.
pub fn push_bounded(ledger: &mut Ledger, record: LedgerRecord, capacity: usize) -> Vec<LedgerRecord> {
    ledger.push_back(record);
    let overflow = ledger.len().saturating_sub(capacity);
    ledger.drain(..overflow).collect()
}

/// Flags the records with the given ids as delivered. Records evicted in the meantime are simply
/// not found. Returns how many records were flagged.
pub fn mark_delivered(ledger: &mut Ledger, ids: &[Uuid]) -> usize {
    let mut marked = 0;
    for record in ledger.iter_mut().filter(|record| ids.contains(&record.id)) {
        record.delivered = true;
        marked += 1;
    }
    marked
}
