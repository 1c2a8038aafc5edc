//! ---
//! gdm_section: "01-core-functionality"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Shared primitives and utilities for the derating monitor."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
//! Shared primitives for the GDM workspace: configuration loading and
//! validation plus the tracing bootstrap consumed by the daemon.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, BusTopics, ControlConfig, DerateConfig, LoadedAppConfig, LoggingConfig, Mode,
};
pub use logging::{init_tracing, LogFormat};
