//! Event subscription (`spec.md` §5, §6 "Events"). Notifications are
//! plain synchronous callbacks — there is no async runtime in this crate —
//! dispatched by `Vault` strictly after a write transaction commits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::store::model::{BlockHeaderRow, TxRow};

/// Default no-op methods so a caller only needs to override what it cares
/// about.
pub trait Subscriber: Send {
    fn on_tx_inserted(&self, _tx: &TxRow) {}
    fn on_tx_status_changed(&self, _tx: &TxRow) {}
    fn on_tx_confirmed(&self, _tx: &TxRow) {}
    fn on_block_inserted(&self, _header: &BlockHeaderRow) {}
    fn on_block_removed(&self, _header: &BlockHeaderRow) {}
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Box<dyn Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        SubscriberRegistry {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, subscriber: Box<dyn Subscriber>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().expect("subscriber registry poisoned").insert(id, subscriber);
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().expect("subscriber registry poisoned").remove(&id.0);
    }

    pub fn notify_tx_inserted(&self, tx: &TxRow) {
        for s in self.subscribers.lock().expect("subscriber registry poisoned").values() {
            s.on_tx_inserted(tx);
        }
    }

    pub fn notify_tx_status_changed(&self, tx: &TxRow) {
        for s in self.subscribers.lock().expect("subscriber registry poisoned").values() {
            s.on_tx_status_changed(tx);
        }
    }

    pub fn notify_tx_confirmed(&self, tx: &TxRow) {
        for s in self.subscribers.lock().expect("subscriber registry poisoned").values() {
            s.on_tx_confirmed(tx);
        }
    }

    pub fn notify_block_inserted(&self, header: &BlockHeaderRow) {
        for s in self.subscribers.lock().expect("subscriber registry poisoned").values() {
            s.on_block_inserted(header);
        }
    }

    pub fn notify_block_removed(&self, header: &BlockHeaderRow) {
        for s in self.subscribers.lock().expect("subscriber registry poisoned").values() {
            s.on_block_removed(header);
        }
    }
}
