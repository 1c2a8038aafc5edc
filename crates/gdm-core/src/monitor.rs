//! ---
//! gdm_section: "04-control-loop"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Polling control loop and state machine."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gdm_bus::{OutputPublisher, SensorGateway, ValueBus};
use gdm_calc::{derated_output, DerateInputs, DerateModel};
use gdm_common::config::{AppConfig, DerateConfig};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::state::{LoopState, SwitchDebouncer};

/// The polling control loop.
///
/// Owns every piece of cross-tick state: the confirmed switch state and
/// its debounce counters, the last successfully published limit (the
/// hysteresis reference), and the last known good reading per sensor.
/// Nothing else survives a tick.
pub struct DerateMonitor {
    model: DerateModel,
    poll_interval: Duration,
    hysteresis: f64,
    gateway: SensorGateway,
    publisher: OutputPublisher,
    debouncer: SwitchDebouncer,
    seeded: bool,
    last_published: Option<f64>,
    last_good: DerateInputs,
    shutdown: watch::Receiver<bool>,
}

impl DerateMonitor {
    /// Build a monitor from validated configuration and a bus handle.
    ///
    /// Until the switch topic yields its first reading the loop sits in
    /// `Disabled` and pins the ceiling, which is the bypass behaviour and
    /// safe for a generator that may already be running.
    pub fn new(
        config: &AppConfig,
        bus: Arc<dyn ValueBus>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let gateway = SensorGateway::new(
            bus.clone(),
            config.bus.clone(),
            config.control.bus_timeout,
        );
        let publisher = OutputPublisher::new(
            bus,
            config.bus.current_limit.clone(),
            config.control.bus_timeout,
        );
        Self {
            model: derate_model(&config.derate),
            poll_interval: config.control.poll_interval,
            hysteresis: config.hysteresis_margin(),
            gateway,
            publisher,
            debouncer: SwitchDebouncer::new(LoopState::Disabled, config.control.debounce_ticks),
            seeded: false,
            last_published: None,
            last_good: DerateInputs::default(),
            shutdown,
        }
    }

    /// Run until the shutdown signal fires. The current tick always
    /// completes before the loop exits.
    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_interval = ?self.poll_interval,
            hysteresis_amps = self.hysteresis,
            state = ?self.debouncer.confirmed(),
            "derating monitor started"
        );

        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("shutdown signal received");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("derating monitor stopped");
        Ok(())
    }

    async fn tick(&mut self) {
        self.poll_switch().await;
        match self.debouncer.confirmed() {
            LoopState::Disabled => self.pin_to_ceiling().await,
            LoopState::Active => self.evaluate_and_publish().await,
        }
    }

    async fn poll_switch(&mut self) {
        match self.gateway.derate_enabled().await {
            Ok(Some(enabled)) => {
                if !self.seeded {
                    // First successful reading seeds the state directly so
                    // the loop does not wait a debounce window to leave the
                    // startup default.
                    self.seeded = true;
                    let initial = LoopState::from_enabled(enabled);
                    self.debouncer.reset_to(initial);
                    self.last_published = None;
                    info!(state = ?initial, "operator switch state seeded");
                } else if let Some(next) = self.debouncer.observe(enabled) {
                    // Forgetting the published value forces the next branch
                    // to publish regardless of hysteresis.
                    self.last_published = None;
                    match next {
                        LoopState::Disabled => {
                            info!("derating disabled by operator; pinning output to ceiling")
                        }
                        LoopState::Active => info!("derating enabled by operator"),
                    }
                }
            }
            Ok(None) => {
                warn!(state = ?self.debouncer.confirmed(), "enable switch not available; holding state")
            }
            Err(err) => {
                warn!(error = %err, state = ?self.debouncer.confirmed(), "enable switch read failed; holding state")
            }
        }
    }

    async fn pin_to_ceiling(&mut self) {
        let target = round_tenth(self.model.ceiling());
        if self.last_published != Some(target) {
            self.publish(target, "bypass").await;
        }
    }

    async fn evaluate_and_publish(&mut self) {
        let inputs = self.read_sensors().await;
        let result = derated_output(&self.model, &inputs);
        if result.missing.any() {
            warn!(
                outdoor_missing = result.missing.outdoor_temp,
                generator_missing = result.missing.generator_temp,
                altitude_missing = result.missing.altitude,
                "derating with reference fallback for unavailable sensors"
            );
        }
        debug!(
            temp_excess = result.temp_excess,
            altitude_excess = result.altitude_excess,
            amps = result.amps,
            "derate evaluated"
        );

        let amps = round_tenth(result.amps);
        let should_publish = match self.last_published {
            None => true,
            Some(last) => (amps - last).abs() > self.hysteresis,
        };
        if should_publish {
            self.publish(amps, "derate").await;
        }
    }

    async fn read_sensors(&mut self) -> DerateInputs {
        let outdoor = self.gateway.outdoor_temperature().await;
        let outdoor = resolve(outdoor, &mut self.last_good.outdoor_temp, "outdoor-temperature");
        let generator = self.gateway.generator_temperature().await;
        let generator = resolve(
            generator,
            &mut self.last_good.generator_temp,
            "generator-temperature",
        );
        let altitude = self.gateway.altitude().await;
        let altitude = resolve(altitude, &mut self.last_good.altitude, "altitude");
        DerateInputs {
            outdoor_temp: outdoor,
            generator_temp: generator,
            altitude,
        }
    }

    async fn publish(&mut self, amps: f64, reason: &'static str) {
        match self.publisher.publish_current_limit(amps).await {
            Ok(()) => {
                info!(amps, reason, "published generator current limit");
                self.last_published = Some(amps);
            }
            Err(err) => {
                // Forgetting the reference value defeats hysteresis on the
                // next tick, which is the retry.
                warn!(amps, error = %err, "failed to publish current limit; retrying next tick");
                self.last_published = None;
            }
        }
    }
}

/// Map one sensor read outcome onto the value fed to the calculator,
/// maintaining the last-known-good cache.
fn resolve(
    reading: gdm_bus::Result<Option<f64>>,
    cache: &mut Option<f64>,
    channel: &'static str,
) -> Option<f64> {
    match reading {
        Ok(Some(value)) => {
            *cache = Some(value);
            Some(value)
        }
        Ok(None) => {
            debug!(channel, "sensor not available; reference fallback");
            None
        }
        Err(err) => match *cache {
            Some(value) => {
                warn!(channel, error = %err, value, "sensor read failed; substituting last known reading");
                Some(value)
            }
            None => {
                warn!(channel, error = %err, "sensor read failed with no prior reading; reference fallback");
                None
            }
        },
    }
}

fn derate_model(config: &DerateConfig) -> DerateModel {
    DerateModel {
        rated_output_current: config.rated_output_current,
        temp_derate_coefficient: config.temp_derate_coefficient,
        temp_reference: config.temp_reference,
        altitude_derate_coefficient: config.altitude_derate_coefficient,
        altitude_reference: config.altitude_reference,
        min_output_current: config.min_output_current,
        output_safety_factor: config.output_safety_factor,
    }
}

/// The bus carries the limit with one decimal of precision.
fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_keeps_one_decimal() {
        assert_eq!(round_tenth(79.84), 79.8);
        assert_eq!(round_tenth(79.85), 79.9);
        assert_eq!(round_tenth(-12.34), -12.3);
    }

    #[test]
    fn resolve_prefers_fresh_then_cached_then_reference() {
        let mut cache = None;
        assert_eq!(resolve(Ok(Some(41.0)), &mut cache, "test"), Some(41.0));
        assert_eq!(cache, Some(41.0));

        let failed: gdm_bus::Result<Option<f64>> =
            Err(gdm_bus::BusError::Backend("gone".into()));
        assert_eq!(resolve(failed, &mut cache, "test"), Some(41.0));

        // Explicit sentinel means reference fallback, not the cache.
        assert_eq!(resolve(Ok(None), &mut cache, "test"), None);

        let mut empty = None;
        let failed: gdm_bus::Result<Option<f64>> =
            Err(gdm_bus::BusError::Backend("gone".into()));
        assert_eq!(resolve(failed, &mut empty, "test"), None);
    }
}
