//! ---
//! gdm_section: "02-gateway-bus"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Gateway bus abstraction and typed sensor access."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{BusError, Result};
use crate::gateway::{BusValue, ValueBus};

#[derive(Debug, Default)]
struct MemoryState {
    /// Topic map; `None` is the explicit not-available sentinel.
    topics: HashMap<String, Option<BusValue>>,
    /// Topics whose reads fail with a backend error until cleared.
    read_failures: HashMap<String, String>,
    /// When set, every write fails with this message.
    write_failure: Option<String>,
    /// Artificial latency applied to reads, for timeout testing.
    read_delay: Option<Duration>,
    /// Log of successful writes in order.
    writes: Vec<(String, BusValue)>,
}

/// In-memory bus backed by a mutex-protected topic map.
///
/// Primarily for tests and single-process integration: topics, sentinel
/// values, backend faults, and latency can all be injected.
#[derive(Debug, Default)]
pub struct MemoryBus {
    state: Mutex<MemoryState>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_float(&self, topic: &str, value: f64) {
        self.state
            .lock()
            .topics
            .insert(topic.to_owned(), Some(BusValue::Float(value)));
    }

    pub fn set_bool(&self, topic: &str, value: bool) {
        self.state
            .lock()
            .topics
            .insert(topic.to_owned(), Some(BusValue::Bool(value)));
    }

    /// Publish the topic with the not-available sentinel.
    pub fn set_unavailable(&self, topic: &str) {
        self.state.lock().topics.insert(topic.to_owned(), None);
    }

    /// Remove the topic entirely; subsequent reads see `MissingTopic`.
    pub fn remove(&self, topic: &str) {
        self.state.lock().topics.remove(topic);
    }

    /// Make reads of `topic` fail with a backend error until cleared.
    pub fn fail_reads(&self, topic: &str, message: &str) {
        self.state
            .lock()
            .read_failures
            .insert(topic.to_owned(), message.to_owned());
    }

    pub fn clear_read_failure(&self, topic: &str) {
        self.state.lock().read_failures.remove(topic);
    }

    /// Make every write fail until re-enabled with `None`.
    pub fn fail_writes(&self, message: Option<&str>) {
        self.state.lock().write_failure = message.map(str::to_owned);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().read_delay = Some(delay);
    }

    /// Successful writes observed so far, in order.
    pub fn writes(&self) -> Vec<(String, BusValue)> {
        self.state.lock().writes.clone()
    }

    /// Values of the write log for a single topic.
    pub fn written_floats(&self, topic: &str) -> Vec<f64> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, v)| v.as_f64())
            .collect()
    }
}

#[async_trait]
impl ValueBus for MemoryBus {
    async fn read(&self, topic: &str) -> Result<Option<BusValue>> {
        let delay = self.state.lock().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if let Some(message) = state.read_failures.get(topic) {
            return Err(BusError::Backend(message.clone()));
        }
        match state.topics.get(topic) {
            Some(value) => Ok(*value),
            None => Err(BusError::MissingTopic(topic.to_owned())),
        }
    }

    async fn write(&self, topic: &str, value: BusValue) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(message) = &state.write_failure {
            return Err(BusError::Backend(message.clone()));
        }
        state.topics.insert(topic.to_owned(), Some(value));
        state.writes.push((topic.to_owned(), value));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
