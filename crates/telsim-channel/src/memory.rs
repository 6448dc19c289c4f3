//! In-process channel transport.
//!
//! Stands in for the process-control network during dry runs and tests.
//! Every write is journaled so callers can check ordering afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::{Callback, Channel, ChannelError, ChannelValue, SubscriptionId};

#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub name: String,
    pub value: ChannelValue,
    pub wait: bool,
}

#[derive(Default)]
struct Slot {
    value: Option<ChannelValue>,
    subscribers: Vec<(SubscriptionId, Arc<Callback>)>,
}

#[derive(Default)]
struct BusInner {
    slots: HashMap<String, Slot>,
    failed: HashSet<String>,
    journal: Vec<JournalEntry>,
    next_sub: SubscriptionId,
}

#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<BusInner>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self, name: &str) -> BusChannel {
        self.lock().slots.entry(name.to_string()).or_default();
        BusChannel { bus: self.clone(), name: name.to_string() }
    }

    /// Set a value from the remote side, for readbacks and initial values.
    /// Not journaled; subscribers are notified if the value changed.
    pub fn post(&self, name: &str, value: impl Into<ChannelValue>) {
        self.store(name, value.into());
    }

    pub fn peek(&self, name: &str) -> Option<ChannelValue> {
        self.lock().slots.get(name).and_then(|s| s.value.clone())
    }

    pub fn peek_f64(&self, name: &str) -> Option<f64> {
        self.peek(name).and_then(|v| v.as_f64())
    }

    /// Make every read/write on `name` fail until cleared.
    pub fn set_failed(&self, name: &str, failed: bool) {
        let mut inner = self.lock();
        if failed {
            inner.failed.insert(name.to_string());
        } else {
            inner.failed.remove(name);
        }
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn store(&self, name: &str, value: ChannelValue) {
        // Callbacks run after the lock is released so they may read the bus.
        let subscribers: Vec<Arc<Callback>> = {
            let mut inner = self.lock();
            let slot = inner.slots.entry(name.to_string()).or_default();
            if slot.value.as_ref() == Some(&value) {
                return;
            }
            slot.value = Some(value.clone());
            slot.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for cb in subscribers {
            cb(&value);
        }
    }

    fn check(&self, name: &str) -> Result<(), ChannelError> {
        if self.lock().failed.contains(name) {
            return Err(ChannelError::Disconnected { name: name.to_string() });
        }
        Ok(())
    }
}

/// Facade over one named slot of a [`MemoryBus`].
#[derive(Clone)]
pub struct BusChannel {
    bus: MemoryBus,
    name: String,
}

impl Channel for BusChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<ChannelValue, ChannelError> {
        self.bus.check(&self.name)?;
        self.bus
            .peek(&self.name)
            .ok_or_else(|| ChannelError::Timeout { name: self.name.clone() })
    }

    fn write(&self, value: ChannelValue, wait: bool) -> Result<(), ChannelError> {
        self.bus.check(&self.name)?;
        debug!("bus write {} <- {} (wait={})", self.name, value, wait);
        self.bus.lock().journal.push(JournalEntry {
            name: self.name.clone(),
            value: value.clone(),
            wait,
        });
        self.bus.store(&self.name, value);
        Ok(())
    }

    fn subscribe(&self, callback: Callback) -> Result<SubscriptionId, ChannelError> {
        self.bus.check(&self.name)?;
        let mut inner = self.bus.lock();
        inner.next_sub += 1;
        let id = inner.next_sub;
        inner
            .slots
            .entry(self.name.clone())
            .or_default()
            .subscribers
            .push((id, Arc::new(callback)));
        Ok(id)
    }
}
