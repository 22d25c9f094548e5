// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Discrete-event simulation core for downlink radio-resource allocation.
//!
//! A [`simulation::Simulation`] owns one event loop ([`engine::Engine`]),
//! one arena of terminals/flows/applications ([`world::World`]), and the
//! policy set a [`config::ScenarioConfig`] selects (admission, pre-emption,
//! priority, QoS monitor, scheduler). Nothing here is a process-wide
//! singleton: building and running several `Simulation`s in one process
//! never cross-talks.

pub mod admission;
pub mod amc;
pub mod application;
pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod ids;
pub mod packet;
pub mod preemption;
pub mod priority;
pub mod qci;
pub mod qos_monitor;
pub mod rng;
pub mod scheduler;
pub mod simulation;
pub mod terminal;
pub mod time;
pub mod trace;
pub mod world;

pub use config::ScenarioConfig;
pub use error::{SimError, SimResult};
pub use simulation::{RunSummary, Simulation};
pub use time::Time;
