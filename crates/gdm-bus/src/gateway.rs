//! ---
//! gdm_section: "02-gateway-bus"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Gateway bus abstraction and typed sensor access."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gdm_common::config::BusTopics;
use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};

/// A value carried on one bus topic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BusValue {
    Float(f64),
    Bool(bool),
}

impl BusValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BusValue::Float(v) => Some(*v),
            BusValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BusValue::Bool(v) => Some(*v),
            BusValue::Float(_) => None,
        }
    }
}

/// Transport abstraction over the gateway's shared value bus.
///
/// `Ok(None)` is the explicit not-available sentinel: the topic exists
/// but its publisher currently has no value for it. Errors cover the
/// transport-level failures (missing topic, timeout, backend fault).
#[async_trait]
pub trait ValueBus: Send + Sync {
    /// Read the current value of a topic.
    async fn read(&self, topic: &str) -> Result<Option<BusValue>>;
    /// Write a value to a topic.
    async fn write(&self, topic: &str, value: BusValue) -> Result<()>;
    /// Human-readable backend name for logging.
    fn name(&self) -> &'static str;
}

/// Construct the production bus transport.
///
/// The gateway's native bus is driven by external device drivers and an
/// adapter for it ships separately; until one is linked in, requesting
/// production transport reports that fact instead of guessing.
pub fn production_bus() -> Result<Arc<dyn ValueBus>> {
    Err(BusError::Unimplemented("gateway production transport"))
}

/// Typed read access to the sensor topics the derating monitor consumes.
///
/// Every read is bounded by the configured timeout so one stuck bus
/// operation cannot stall the control loop.
pub struct SensorGateway {
    bus: Arc<dyn ValueBus>,
    topics: BusTopics,
    timeout: Duration,
}

impl SensorGateway {
    pub fn new(bus: Arc<dyn ValueBus>, topics: BusTopics, timeout: Duration) -> Self {
        Self {
            bus,
            topics,
            timeout,
        }
    }

    pub async fn outdoor_temperature(&self) -> Result<Option<f64>> {
        self.read_numeric(&self.topics.outdoor_temperature).await
    }

    pub async fn generator_temperature(&self) -> Result<Option<f64>> {
        self.read_numeric(&self.topics.generator_temperature).await
    }

    pub async fn altitude(&self) -> Result<Option<f64>> {
        self.read_numeric(&self.topics.altitude).await
    }

    /// The operator switch, already normalized so `true` enables derating.
    pub async fn derate_enabled(&self) -> Result<Option<bool>> {
        let topic = &self.topics.enable_switch;
        match self.read_bounded(topic).await? {
            None => Ok(None),
            Some(value) => value.as_bool().map(Some).ok_or_else(|| BusError::WrongType {
                topic: topic.clone(),
                expected: "boolean",
            }),
        }
    }

    async fn read_numeric(&self, topic: &str) -> Result<Option<f64>> {
        match self.read_bounded(topic).await? {
            None => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| BusError::WrongType {
                topic: topic.to_owned(),
                expected: "numeric",
            }),
        }
    }

    async fn read_bounded(&self, topic: &str) -> Result<Option<BusValue>> {
        tokio::time::timeout(self.timeout, self.bus.read(topic))
            .await
            .map_err(|_| BusError::Timeout(self.timeout))?
    }
}

/// Typed write access to the generator's output-current limit topic.
pub struct OutputPublisher {
    bus: Arc<dyn ValueBus>,
    topic: String,
    timeout: Duration,
}

impl OutputPublisher {
    pub fn new(bus: Arc<dyn ValueBus>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bus,
            topic: topic.into(),
            timeout,
        }
    }

    /// Publish the allowed maximum output current in amps.
    pub async fn publish_current_limit(&self, amps: f64) -> Result<()> {
        tokio::time::timeout(self.timeout, self.bus.write(&self.topic, BusValue::Float(amps)))
            .await
            .map_err(|_| BusError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBus;

    fn gateway(bus: Arc<MemoryBus>) -> SensorGateway {
        SensorGateway::new(bus, BusTopics::default(), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn typed_reads_resolve_configured_topics() {
        let bus = Arc::new(MemoryBus::new());
        let topics = BusTopics::default();
        bus.set_float(&topics.outdoor_temperature, 31.5);
        bus.set_float(&topics.altitude, -12.0);
        bus.set_bool(&topics.enable_switch, true);

        let gateway = gateway(bus);
        assert_eq!(gateway.outdoor_temperature().await.unwrap(), Some(31.5));
        assert_eq!(gateway.altitude().await.unwrap(), Some(-12.0));
        assert_eq!(gateway.derate_enabled().await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn sentinel_values_surface_as_none() {
        let bus = Arc::new(MemoryBus::new());
        let topics = BusTopics::default();
        bus.set_unavailable(&topics.generator_temperature);

        let gateway = gateway(bus);
        assert_eq!(gateway.generator_temperature().await.unwrap(), None);
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let bus = Arc::new(MemoryBus::new());
        let topics = BusTopics::default();
        bus.set_bool(&topics.outdoor_temperature, true);

        let gateway = gateway(bus);
        assert!(matches!(
            gateway.outdoor_temperature().await,
            Err(BusError::WrongType { .. })
        ));
    }

    #[tokio::test]
    async fn slow_reads_are_bounded_by_the_timeout() {
        let bus = Arc::new(MemoryBus::new());
        let topics = BusTopics::default();
        bus.set_float(&topics.outdoor_temperature, 20.0);
        bus.set_read_delay(Duration::from_secs(5));

        let gateway = SensorGateway::new(bus, topics, Duration::from_millis(20));
        assert!(matches!(
            gateway.outdoor_temperature().await,
            Err(BusError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn publisher_writes_the_limit_topic() {
        let bus = Arc::new(MemoryBus::new());
        let topics = BusTopics::default();
        let publisher = OutputPublisher::new(
            bus.clone(),
            topics.current_limit.clone(),
            Duration::from_millis(100),
        );

        publisher.publish_current_limit(56.3).await.unwrap();
        assert_eq!(
            bus.writes(),
            vec![(topics.current_limit.clone(), BusValue::Float(56.3))]
        );
    }

    #[test]
    fn production_transport_is_not_yet_available() {
        assert!(matches!(
            production_bus(),
            Err(BusError::Unimplemented(_))
        ));
    }
}
