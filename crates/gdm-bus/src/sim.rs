//! ---
//! gdm_section: "02-gateway-bus"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Gateway bus abstraction and typed sensor access."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::Normal;

use async_trait::async_trait;
use gdm_common::config::BusTopics;

use crate::error::{BusError, Result};
use crate::gateway::{BusValue, ValueBus};

/// Starting conditions for the synthetic sensor walk.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticProfile {
    pub outdoor_start: f64,
    pub generator_start: f64,
    pub altitude: f64,
    pub noise_sigma: f64,
    pub enabled: bool,
}

impl Default for SyntheticProfile {
    fn default() -> Self {
        Self {
            outdoor_start: 24.0,
            generator_start: 55.0,
            altitude: 350.0,
            noise_sigma: 0.6,
            enabled: true,
        }
    }
}

#[derive(Debug)]
struct WalkState {
    rng: StdRng,
    noise: Normal<f64>,
    outdoor: f64,
    generator: f64,
    altitude: f64,
    enabled: bool,
    limit: Option<f64>,
}

/// Seeded random-walk bus backend for simulation mode and bring-up.
///
/// Each read advances the walked value so a polling loop sees plausible
/// drifting sensors without any hardware attached. The generator
/// temperature trends upward from its start to mimic a warming engine
/// block; the others wander around their profile values.
#[derive(Debug)]
pub struct SyntheticBus {
    topics: BusTopics,
    profile: SyntheticProfile,
    state: Mutex<WalkState>,
}

impl SyntheticBus {
    pub fn new(seed: u64, topics: BusTopics, profile: SyntheticProfile) -> Self {
        let noise = Normal::new(0.0, profile.noise_sigma.max(f64::MIN_POSITIVE))
            .expect("sigma must be positive");
        Self {
            topics,
            profile,
            state: Mutex::new(WalkState {
                rng: StdRng::seed_from_u64(seed),
                noise,
                outdoor: profile.outdoor_start,
                generator: profile.generator_start,
                altitude: profile.altitude,
                enabled: profile.enabled,
                limit: None,
            }),
        }
    }

    /// Flip the simulated operator switch.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    /// Last limit written by the monitor, if any.
    pub fn last_limit(&self) -> Option<f64> {
        self.state.lock().limit
    }
}

#[async_trait]
impl ValueBus for SyntheticBus {
    async fn read(&self, topic: &str) -> Result<Option<BusValue>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if topic == self.topics.outdoor_temperature {
            let step = state.noise.sample(&mut state.rng) * 0.3;
            state.outdoor = (state.outdoor + step)
                .clamp(self.profile.outdoor_start - 15.0, self.profile.outdoor_start + 25.0);
            Ok(Some(BusValue::Float(state.outdoor)))
        } else if topic == self.topics.generator_temperature {
            let step = 0.2 + state.noise.sample(&mut state.rng) * 0.5;
            state.generator = (state.generator + step)
                .clamp(self.profile.generator_start, self.profile.generator_start + 45.0);
            Ok(Some(BusValue::Float(state.generator)))
        } else if topic == self.topics.altitude {
            let step = state.noise.sample(&mut state.rng) * 0.1;
            state.altitude += step;
            Ok(Some(BusValue::Float(state.altitude)))
        } else if topic == self.topics.enable_switch {
            Ok(Some(BusValue::Bool(state.enabled)))
        } else {
            Err(BusError::MissingTopic(topic.to_owned()))
        }
    }

    async fn write(&self, topic: &str, value: BusValue) -> Result<()> {
        if topic != self.topics.current_limit {
            return Err(BusError::MissingTopic(topic.to_owned()));
        }
        match value.as_f64() {
            Some(amps) => {
                self.state.lock().limit = Some(amps);
                Ok(())
            }
            None => Err(BusError::Backend("limit topic expects a number".to_owned())),
        }
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn walked_sensors_stay_near_their_profile() {
        let bus = SyntheticBus::new(42, BusTopics::default(), SyntheticProfile::default());
        let topics = BusTopics::default();
        for _ in 0..50 {
            let outdoor = bus.read(&topics.outdoor_temperature).await.unwrap();
            let outdoor = outdoor.and_then(|v| v.as_f64()).unwrap();
            assert!((9.0..=49.0).contains(&outdoor));

            let generator = bus.read(&topics.generator_temperature).await.unwrap();
            let generator = generator.and_then(|v| v.as_f64()).unwrap();
            assert!((55.0..=100.0).contains(&generator));
        }
    }

    #[tokio::test]
    async fn identical_seeds_walk_identically() {
        let topics = BusTopics::default();
        let a = SyntheticBus::new(7, topics.clone(), SyntheticProfile::default());
        let b = SyntheticBus::new(7, topics.clone(), SyntheticProfile::default());
        for _ in 0..10 {
            assert_eq!(
                a.read(&topics.outdoor_temperature).await.unwrap(),
                b.read(&topics.outdoor_temperature).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn switch_follows_the_simulated_operator() {
        let topics = BusTopics::default();
        let bus = SyntheticBus::new(1, topics.clone(), SyntheticProfile::default());
        assert_eq!(
            bus.read(&topics.enable_switch).await.unwrap(),
            Some(BusValue::Bool(true))
        );
        bus.set_enabled(false);
        assert_eq!(
            bus.read(&topics.enable_switch).await.unwrap(),
            Some(BusValue::Bool(false))
        );
    }

    #[tokio::test]
    async fn only_the_limit_topic_accepts_writes() {
        let topics = BusTopics::default();
        let bus = SyntheticBus::new(1, topics.clone(), SyntheticProfile::default());
        bus.write(&topics.current_limit, BusValue::Float(48.5))
            .await
            .unwrap();
        assert_eq!(bus.last_limit(), Some(48.5));

        assert!(bus
            .write(&topics.altitude, BusValue::Float(100.0))
            .await
            .is_err());
    }
}
