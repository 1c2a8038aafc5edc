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

use gdm_bus::{MemoryBus, ValueBus};
use gdm_common::config::{
    AppConfig, BusTopics, ControlConfig, DerateConfig, LoggingConfig, Mode,
};
use gdm_core::DerateMonitor;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const POLL: Duration = Duration::from_millis(25);

/// Plenty of ticks at the 25 ms test cadence.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

fn test_config() -> AppConfig {
    AppConfig {
        mode: Mode::Production,
        derate: DerateConfig {
            rated_output_current: 100.0,
            temp_derate_coefficient: 2.0,
            temp_reference: 30.0,
            altitude_derate_coefficient: 0.01,
            altitude_reference: 1000.0,
            min_output_current: 20.0,
            output_safety_factor: 1.0,
        },
        control: ControlConfig {
            poll_interval: POLL,
            hysteresis_margin: None,
            debounce_ticks: 2,
            bus_timeout: Duration::from_millis(250),
        },
        bus: BusTopics::default(),
        logging: LoggingConfig::default(),
    }
}

fn seed_sensors(bus: &MemoryBus, topics: &BusTopics, outdoor: f64, generator: f64, altitude: f64) {
    bus.set_float(&topics.outdoor_temperature, outdoor);
    bus.set_float(&topics.generator_temperature, generator);
    bus.set_float(&topics.altitude, altitude);
}

fn spawn_monitor(
    config: &AppConfig,
    bus: Arc<MemoryBus>,
) -> (watch::Sender<bool>, JoinHandle<anyhow::Result<()>>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = DerateMonitor::new(config, bus as Arc<dyn ValueBus>, shutdown_rx);
    let task = tokio::spawn(monitor.run());
    (shutdown_tx, task)
}

async fn stop(shutdown: watch::Sender<bool>, task: JoinHandle<anyhow::Result<()>>) {
    shutdown.send(true).expect("monitor alive");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("monitor exits promptly")
        .expect("task join")
        .expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_switch_pins_output_to_rated_current() {
    let config = test_config();
    let bus = Arc::new(MemoryBus::new());
    // Hot sensors that would derate hard if the switch were on.
    seed_sensors(&bus, &config.bus, 40.0, 35.0, 1000.0);
    bus.set_bool(&config.bus.enable_switch, false);

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;
    stop(shutdown, task).await;

    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![100.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn active_switch_follows_the_calculator() {
    let config = test_config();
    let bus = Arc::new(MemoryBus::new());
    // Temp excess 10 from the hotter of the two readings.
    seed_sensors(&bus, &config.bus, 40.0, 35.0, 1000.0);
    bus.set_bool(&config.bus.enable_switch, true);

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;
    stop(shutdown, task).await;

    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![80.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sub_margin_changes_are_not_republished() {
    let config = test_config();
    let bus = Arc::new(MemoryBus::new());
    seed_sensors(&bus, &config.bus, 40.0, 35.0, 1000.0);
    bus.set_bool(&config.bus.enable_switch, true);

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;
    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![80.0]);

    // 0.2 A of movement sits inside the default 0.5 A margin.
    bus.set_float(&config.bus.outdoor_temperature, 40.1);
    settle().await;
    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![80.0]);

    // A real shift republishes.
    bus.set_float(&config.bus.outdoor_temperature, 45.0);
    settle().await;
    stop(shutdown, task).await;
    assert_eq!(
        bus.written_floats(&config.bus.current_limit),
        vec![80.0, 70.0]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switching_off_pins_the_ceiling_after_debounce() {
    let config = test_config();
    let bus = Arc::new(MemoryBus::new());
    seed_sensors(&bus, &config.bus, 40.0, 35.0, 1000.0);
    bus.set_bool(&config.bus.enable_switch, true);

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;

    bus.set_bool(&config.bus.enable_switch, false);
    settle().await;
    stop(shutdown, task).await;

    assert_eq!(
        bus.written_floats(&config.bus.current_limit),
        vec![80.0, 100.0]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn short_switch_glitch_does_not_change_state() {
    let mut config = test_config();
    // A debounce window far longer than the test keeps the outcome
    // independent of tick alignment.
    config.control.debounce_ticks = 1000;
    let bus = Arc::new(MemoryBus::new());
    seed_sensors(&bus, &config.bus, 40.0, 35.0, 1000.0);
    bus.set_bool(&config.bus.enable_switch, true);

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;

    bus.set_bool(&config.bus.enable_switch, false);
    tokio::time::sleep(Duration::from_millis(60)).await;
    bus.set_bool(&config.bus.enable_switch, true);
    settle().await;
    stop(shutdown, task).await;

    // Only the initial derate publish; the glitch never confirmed.
    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![80.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_sensor_reads_substitute_last_known_good() {
    let config = test_config();
    let bus = Arc::new(MemoryBus::new());
    seed_sensors(&bus, &config.bus, 40.0, 35.0, 1000.0);
    bus.set_bool(&config.bus.enable_switch, true);

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;
    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![80.0]);

    // Outdoor sensor drops off the bus; its last reading of 40 keeps
    // feeding the calculation while the generator heats up.
    bus.fail_reads(&config.bus.outdoor_temperature, "service lost");
    bus.set_float(&config.bus.generator_temperature, 50.0);
    settle().await;
    stop(shutdown, task).await;

    assert_eq!(
        bus.written_floats(&config.bus.current_limit),
        vec![80.0, 60.0]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unavailable_sensor_falls_back_to_its_reference() {
    let config = test_config();
    let bus = Arc::new(MemoryBus::new());
    bus.set_unavailable(&config.bus.outdoor_temperature);
    bus.set_float(&config.bus.generator_temperature, 40.0);
    bus.set_float(&config.bus.altitude, 1000.0);
    bus.set_bool(&config.bus.enable_switch, true);

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;
    stop(shutdown, task).await;

    // Only the generator's 10 degrees of excess derates.
    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![80.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_publish_is_retried_on_a_later_tick() {
    let config = test_config();
    let bus = Arc::new(MemoryBus::new());
    seed_sensors(&bus, &config.bus, 40.0, 35.0, 1000.0);
    bus.set_bool(&config.bus.enable_switch, true);
    bus.fail_writes(Some("bus busy"));

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;
    // The loop is alive and retrying, but nothing has landed.
    assert!(bus.written_floats(&config.bus.current_limit).is_empty());

    bus.fail_writes(None);
    settle().await;
    stop(shutdown, task).await;

    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![80.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_switch_topic_keeps_the_loop_in_bypass() {
    let config = test_config();
    let bus = Arc::new(MemoryBus::new());
    // No switch topic at all: the loop never leaves its safe default.
    seed_sensors(&bus, &config.bus, 45.0, 45.0, 2000.0);

    let (shutdown, task) = spawn_monitor(&config, bus.clone());
    settle().await;
    stop(shutdown, task).await;

    assert_eq!(bus.written_floats(&config.bus.current_limit), vec![100.0]);
}
