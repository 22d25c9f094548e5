// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Ties the event-loop mechanism ([`crate::engine::Engine`]) to the concrete
//! meaning of each [`SimEvent`]: the arenas it mutates ([`crate::world::World`])
//! and the policies it consults. One `Simulation` owns everything a single
//! run needs, so several runs can coexist in one process without cross-talk
//! (spec Design Notes §9 "Global singletons").

use std::collections::HashMap;

use tracing::{debug, instrument, trace};

use crate::admission::{AdmissionCtx, AdmissionPolicy};
use crate::amc::AmcTable;
use crate::application::Application;
use crate::config::ScenarioConfig;
use crate::engine::{Engine, SimEvent};
use crate::error::{SimError, SimResult};
use crate::ids::{AppId, TerminalId};
use crate::packet::{NETWORK_OVERHEAD, Packet};
use crate::preemption::PreemptionPolicy;
use crate::priority::PriorityPolicy;
use crate::qos_monitor::{QosMonitorCtx, QosMonitorPolicy};
use crate::rng::Distribution;
use crate::scheduler::{SchedulerCtx, SchedulerPolicy};
use crate::time::Time;
use crate::trace::TraceSinks;
use crate::world::World;

/// Outcome of [`Simulation::run`], mirroring [`crate::engine::RunSummary`]
/// but counted by this module since it is the one that knows which events
/// are meaningful versus housekeeping.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
	pub dispatched: u64,
	pub final_time: Time,
}

/// Owns the event-loop mechanism, every arena, every policy, and the trace
/// sinks for one simulation run (spec §1, §4, Design Notes §9).
pub struct Simulation {
	engine: Engine,
	world: World,
	amc: AmcTable,
	admission: Box<dyn AdmissionPolicy>,
	preemption: Box<dyn PreemptionPolicy>,
	priority: Box<dyn PriorityPolicy>,
	qos_monitor: Box<dyn QosMonitorPolicy>,
	scheduler: Box<dyn SchedulerPolicy>,
	trace: TraceSinks,
	last_qos_check: Time,
	qos_interval_ms: u64,
	stats_window_s: u64,
	trace_qos: bool,
	preempt_qos: bool,
}

impl Simulation {
	/// Builds a `Simulation` from a scenario, populating terminals and
	/// applications, and priming the event queue with the first scheduler
	/// tick and the terminating `end_simulation` event. Admission control
	/// for dedicated-flow requests does not run synchronously here: each
	/// application schedules a `CreateApp` event 100ms ahead of its own
	/// `start_time` (clamped to `t=0`), matching the original's
	/// `AppProfile.create_app` lead time, and `on_create_app` is what
	/// actually calls `bind_application` (spec §4.5 `add_application`).
	#[instrument(name = "simulation::build", level = "debug", skip(config))]
	pub fn build(config: ScenarioConfig) -> SimResult<Self> {
		Self::build_with_trace(config, None)
	}

	/// As [`Simulation::build`], but writes traces to in-memory buffers
	/// instead of `config.output_dir` — what scenario tests use so
	/// assertions never touch the filesystem.
	pub fn build_buffered(config: ScenarioConfig) -> SimResult<Self> {
		Self::build_with_trace(config, Some(TraceSinks::buffered()))
	}

	fn build_with_trace(config: ScenarioConfig, trace_override: Option<TraceSinks>) -> SimResult<Self> {
		config.validate()?;
		let engine = Engine::new(Time::from_millis(config.stop_time_ms), config.num_rbs, config.seed, config.rtx_threshold);
		let mut world = World::new();
		let amc = AmcTable::new();
		let admission = config.admission_policy.build();
		let preemption = config.preemption_policy.build();
		let priority = config.priority_policy.build();
		let qos_monitor = config.qos_monitor_policy.build();
		let scheduler = config.scheduler_policy.build();
		let trace = match trace_override {
			Some(t) => t,
			None => TraceSinks::files(&config.output_dir)?,
		};

		let mut terminal_by_imsi: HashMap<u64, TerminalId> = HashMap::new();
		for spec in &config.terminals {
			let (terminal_id, _default_flow) = world.add_terminal(
				spec.imsi,
				spec.name.clone(),
				spec.mcs,
				spec.queue_capacity,
				config.default_qci,
				config.default_arp,
				config.default_mbr,
			);
			terminal_by_imsi.insert(spec.imsi, terminal_id);
			debug!(imsi = spec.imsi, name = %spec.name, "terminal registered");
		}

		let mut sim = Simulation {
			engine,
			world,
			amc,
			admission,
			preemption,
			priority,
			qos_monitor,
			scheduler,
			trace,
			last_qos_check: Time::ZERO,
			qos_interval_ms: config.qos_monitor_interval_ms,
			stats_window_s: config.bearer_stats_window_s,
			trace_qos: config.trace_qos,
			preempt_qos: config.preempt_qos,
		};

		for spec in &config.applications {
			let terminal_id = *terminal_by_imsi
				.get(&spec.terminal_imsi)
				.ok_or(SimError::UnknownTerminal { imsi: spec.terminal_imsi })?;

			let packet_size = Distribution::try_from(&spec.packet_size)?;
			let packet_interval = Distribution::try_from(&spec.packet_interval)?;
			let session_packets = Distribution::try_from(&spec.session_packets)?;
			let session_interval = Distribution::try_from(&spec.session_interval)?;
			let start_time = Time::from_millis(spec.start_time_ms);
			let stop_time = Time::from_millis(spec.stop_time_ms);

			let app = Application::new(
				spec.name.clone(),
				terminal_id,
				packet_size,
				packet_interval,
				session_packets,
				session_interval,
				start_time,
				stop_time,
				spec.dedicated,
			);
			let app_id = sim.world.add_application(app);
			sim.world.terminal_mut(terminal_id).apps.insert(spec.name.clone(), app_id);

			let create_time = Time::from_millis(start_time.as_millis().saturating_sub(100));
			sim.engine.schedule(create_time, SimEvent::CreateApp { app: app_id })?;
			sim.engine.schedule(start_time, SimEvent::StartApp { app: app_id })?;
			sim.engine.schedule(stop_time, SimEvent::StopApp { app: app_id })?;
		}

		sim.engine.schedule(Time::ZERO, SimEvent::SchedulerTick)?;
		sim.engine.schedule(Time::from_millis(config.stop_time_ms), SimEvent::EndSimulation)?;

		Ok(sim)
	}

	pub fn world(&self) -> &World {
		&self.world
	}

	pub fn trace(&self) -> &TraceSinks {
		&self.trace
	}

	pub fn now(&self) -> Time {
		self.engine.now()
	}

	/// Schedules a future dedicated-flow activation request (spec §4.1
	/// `activate_flow_at`) — the hook an external scenario driver uses to
	/// bring up a flow mid-run, outside the `t=0` topology this crate
	/// builds from [`ScenarioConfig`].
	#[allow(clippy::too_many_arguments)]
	pub fn schedule_activate_flow(
		&mut self,
		time: Time,
		terminal: TerminalId,
		app: AppId,
		qci: u8,
		gbr: u64,
		mbr: u64,
		pvi: bool,
		pci: bool,
		arp: u32,
	) -> SimResult<()> {
		self.engine.activate_flow_at(time, terminal, app, qci, gbr, mbr, pvi, pci, arp)
	}

	/// Schedules a future dedicated-flow teardown (spec §4.1
	/// `deactivate_flow_at`).
	pub fn schedule_deactivate_flow(&mut self, time: Time, terminal: TerminalId, flow: crate::ids::FlowId) -> SimResult<()> {
		self.engine.deactivate_flow_at(time, terminal, flow)
	}

	/// Schedules a future QoS modification request against an existing
	/// flow (spec §4.3 `modify_qos`).
	pub fn schedule_modify_flow(&mut self, time: Time, flow: crate::ids::FlowId, qci: u8, gbr: u64, mbr: u64) -> SimResult<()> {
		self.engine.modify_flow_at(time, flow, qci, gbr, mbr)
	}

	/// Requests admission of a dedicated flow for `app_name` on behalf of
	/// `app_id`, or hands back the terminal's default flow on denial or
	/// when the application does not request a dedicated flow at all
	/// (spec §4.5 `Terminal::add_application`).
	fn bind_application(&mut self, terminal_id: TerminalId, app_name: &str, dedicated: bool) -> SimResult<crate::ids::FlowId> {
		let (gbr, mbr, qci, arp, pvi, pci) = self.priority.get_priority(self.world.terminal(terminal_id), app_name);
		if !dedicated {
			return Ok(self.world.terminal(terminal_id).default_flow);
		}

		let now = self.engine.now();
		let num_rbs = self.engine.num_rbs();
		let mut ctx = AdmissionCtx {
			world: &mut self.world,
			amc: &self.amc,
			preemption: self.preemption.as_ref(),
			trace: &mut self.trace,
			now,
			num_rbs,
		};
		match self.admission.check_activation(&mut ctx, terminal_id, qci, gbr, mbr, pvi, pci, arp)? {
			Some(flow_id) => {
				let flow = self.world.flow(flow_id);
				let imsi = self.world.terminal(terminal_id).imsi;
				self.trace.lifecycle_activation(now, imsi, flow.bid, flow.qci, flow.port.unwrap_or(0));
				Ok(flow_id)
			}
			None => Ok(self.world.terminal(terminal_id).default_flow),
		}
	}

	/// Runs to completion, dispatching events in non-decreasing time order
	/// until `end_simulation` pops (spec §4.1 `run`, §5).
	#[instrument(name = "simulation::run", level = "info", skip(self))]
	pub fn run(&mut self) -> SimResult<RunSummary> {
		let mut dispatched = 0u64;
		while let Some((time, event)) = self.engine.pop() {
			dispatched += 1;
			if matches!(event, SimEvent::EndSimulation) {
				self.trace.flush_all();
				debug!(dispatched, final_time = %time, "simulation ended");
				return Ok(RunSummary { dispatched, final_time: time });
			}
			self.dispatch(time, event)?;
		}
		self.trace.flush_all();
		Ok(RunSummary { dispatched, final_time: self.engine.now() })
	}

	fn dispatch(&mut self, now: Time, event: SimEvent) -> SimResult<()> {
		trace!(?now, ?event, "dispatch");
		match event {
			SimEvent::SchedulerTick => self.on_scheduler_tick(now),
			SimEvent::CreateApp { app } => self.on_create_app(app),
			SimEvent::StartApp { app } => self.on_start_app(app),
			SimEvent::StopApp { app } => self.on_stop_app(app),
			SimEvent::GeneratePacket { app } => self.emit_packet(app),
			SimEvent::DeliverPacket { app, pid, wire_bytes } => self.on_deliver_packet(app, pid, wire_bytes),
			SimEvent::ActivateFlow { terminal, app, qci, gbr, mbr, pvi, pci, arp } => {
				self.on_activate_flow(terminal, app, qci, gbr, mbr, pvi, pci, arp)
			}
			SimEvent::DeactivateFlow { terminal, flow } => self.on_deactivate_flow(terminal, flow),
			SimEvent::ModifyFlow { flow, qci, gbr, mbr } => self.on_modify_flow(flow, qci, gbr, mbr),
			SimEvent::EndSimulation => unreachable!("handled in run()"),
		}
	}

	/// One 1ms interval: self-reschedule, gate the QoS monitor, then hand
	/// off the RB pool to the configured scheduler policy (spec §4.2).
	fn on_scheduler_tick(&mut self, now: Time) -> SimResult<()> {
		self.engine.schedule(now + 1, SimEvent::SchedulerTick)?;

		if now >= self.last_qos_check + self.qos_interval_ms {
			self.last_qos_check = now;
			let num_rbs = self.engine.num_rbs();
			let mut qctx = QosMonitorCtx {
				world: &mut self.world,
				amc: &self.amc,
				preemption: self.preemption.as_ref(),
				trace: &mut self.trace,
				now,
				num_rbs,
				stats_window_s: self.stats_window_s,
				trace_qos: self.trace_qos,
				preempt_qos: self.preempt_qos,
			};
			let stats = self.qos_monitor.evaluate(&mut qctx)?;
			debug!(flows_evaluated = stats.len(), "qos monitor invocation");
		}

		let num_rbs = self.engine.num_rbs();
		let rng = self.engine.rng_mut();
		let mut sctx = SchedulerCtx { world: &mut self.world, amc: &self.amc, rng, trace: &mut self.trace, now, num_rbs };
		let deliveries = self.scheduler.run_interval(&mut sctx)?;
		for (time, info) in deliveries {
			self.engine.schedule(time, SimEvent::DeliverPacket { app: info.app, pid: info.pid, wire_bytes: info.wire_bytes })?;
		}
		Ok(())
	}

	/// Runs admission control for `app_id` 100ms ahead of its own
	/// `start_time` and emits its topology trace line (spec §4.5
	/// `add_application`). Deferring this to a scheduled event rather than
	/// running it at build time means applications with staggered
	/// `start_time`s compete for GBR budget in the same order the
	/// original's event queue would have dispatched them in, not all at
	/// once at `t=0`.
	fn on_create_app(&mut self, app_id: AppId) -> SimResult<()> {
		let (terminal_id, name, dedicated, start_time, stop_time) = {
			let app = self.world.app(app_id);
			(app.terminal, app.name.clone(), app.dedicated, app.start_time, app.stop_time)
		};
		let flow_id = self.bind_application(terminal_id, &name, dedicated)?;
		self.world.app_mut(app_id).bound_flow = Some(flow_id);

		let flow = self.world.flow(flow_id);
		self.trace.topology_line(&name, start_time, stop_time, flow.qci, flow.gbr, flow.mbr, flow.port.unwrap_or(0));
		Ok(())
	}

	/// Sets `active`, draws the first session length, and emits the first
	/// packet (spec §4.4 `start`).
	fn on_start_app(&mut self, app_id: AppId) -> SimResult<()> {
		self.world.app_mut(app_id).active = true;
		let session_packets = self.world.app(app_id).session_packets.clone();
		let len = self.engine.rng_mut().sample(&session_packets).max(1.0).round() as u64;
		self.world.app_mut(app_id).session_remaining = len;
		self.emit_packet(app_id)
	}

	/// Deactivates and, if the bound flow is dedicated, tears it down
	/// (spec §4.4 `stop`).
	fn on_stop_app(&mut self, app_id: AppId) -> SimResult<()> {
		let now = self.engine.now();
		self.world.app_mut(app_id).active = false;
		let Some(flow_id) = self.world.app(app_id).bound_flow else {
			return Ok(());
		};
		if self.world.flow(flow_id).alive && !self.world.flow(flow_id).is_default() {
			let flow = self.world.flow(flow_id);
			let imsi = self.world.terminal(flow.terminal).imsi;
			self.trace.admission_line(
				now,
				"DEACTIVATION",
				imsi,
				&format!("BID {} QCI {} GBR {} ARP {} PVI {} PCI {}", flow.bid, flow.qci, flow.gbr, flow.arp, flow.pvi, flow.pci),
			);
			self.trace.lifecycle_deactivation(now, imsi, flow.bid, flow.qci, flow.port.unwrap_or(0));
			self.world.teardown_flow(flow_id)?;
		}
		Ok(())
	}

	/// Draws a packet size, traces TX (pre-inflation), inflates by
	/// [`NETWORK_OVERHEAD`], enqueues on the bound flow, then schedules
	/// the next emission (spec §4.4 each emission).
	fn emit_packet(&mut self, app_id: AppId) -> SimResult<()> {
		let now = self.engine.now();
		let Some(flow_id) = self.world.app(app_id).bound_flow else {
			return Err(SimError::NoFlowBound { app: app_id.index() as u64 });
		};

		let size_dist = self.world.app(app_id).packet_size.clone();
		let raw_size = self.engine.rng_mut().sample(&size_dist).max(1.0).round() as u64;
		let pid = self.engine.next_packet_id();
		let app_name = self.world.app(app_id).name.clone();
		self.trace.traffic_line(&app_name, now, "TX", raw_size, pid);

		let packet = Packet::new(pid, raw_size + NETWORK_OVERHEAD, now, app_id);
		self.world.flow_mut(flow_id).enqueue(packet, now);

		let session_empty = {
			let app = self.world.app_mut(app_id);
			app.session_remaining = app.session_remaining.saturating_sub(1);
			app.session_remaining == 0
		};

		if session_empty {
			let session_packets = self.world.app(app_id).session_packets.clone();
			let session_interval = self.world.app(app_id).session_interval.clone();
			let new_len = self.engine.rng_mut().sample(&session_packets).max(1.0).round() as u64;
			self.world.app_mut(app_id).session_remaining = new_len;
			let delay = self.engine.rng_mut().sample_as_time(&session_interval);
			self.engine.schedule(now + delay.as_millis(), SimEvent::GeneratePacket { app: app_id })?;
		} else {
			let packet_interval = self.world.app(app_id).packet_interval.clone();
			let delay = self.engine.rng_mut().sample_as_time(&packet_interval);
			self.engine.schedule(now + delay.as_millis(), SimEvent::GeneratePacket { app: app_id })?;
		}
		Ok(())
	}

	/// Deflates by [`NETWORK_OVERHEAD`] and traces RX (spec §4.4
	/// `receive_packet`).
	fn on_deliver_packet(&mut self, app_id: AppId, pid: u64, wire_bytes: u64) -> SimResult<()> {
		let now = self.engine.now();
		let payload = wire_bytes.saturating_sub(NETWORK_OVERHEAD);
		let app_name = self.world.app(app_id).name.clone();
		self.trace.traffic_line(&app_name, now, "RX", payload, pid);
		Ok(())
	}

	/// Requests admission of a dedicated flow scheduled ahead of time via
	/// [`crate::engine::Engine::activate_flow_at`]; on acceptance rebinds
	/// `app` to the new flow (spec §4.1 `activate_flow_at`).
	#[allow(clippy::too_many_arguments)]
	fn on_activate_flow(&mut self, terminal: TerminalId, app: AppId, qci: u8, gbr: u64, mbr: u64, pvi: bool, pci: bool, arp: u32) -> SimResult<()> {
		let now = self.engine.now();
		let num_rbs = self.engine.num_rbs();
		let mut ctx = AdmissionCtx {
			world: &mut self.world,
			amc: &self.amc,
			preemption: self.preemption.as_ref(),
			trace: &mut self.trace,
			now,
			num_rbs,
		};
		if let Some(flow_id) = self.admission.check_activation(&mut ctx, terminal, qci, gbr, mbr, pvi, pci, arp)? {
			let flow = self.world.flow(flow_id);
			let imsi = self.world.terminal(terminal).imsi;
			self.trace.lifecycle_activation(now, imsi, flow.bid, flow.qci, flow.port.unwrap_or(0));
			self.world.app_mut(app).bound_flow = Some(flow_id);
		}
		Ok(())
	}

	/// Tears down `flow` via [`crate::engine::Engine::deactivate_flow_at`]
	/// (spec §4.1 `deactivate_flow_at`). A no-op if the flow is already
	/// gone or is the terminal's default flow.
	fn on_deactivate_flow(&mut self, terminal: TerminalId, flow: crate::ids::FlowId) -> SimResult<()> {
		if !self.world.flow(flow).alive || self.world.flow(flow).is_default() {
			return Ok(());
		}
		let now = self.engine.now();
		let f = self.world.flow(flow);
		let imsi = self.world.terminal(terminal).imsi;
		self.trace.lifecycle_deactivation(now, imsi, f.bid, f.qci, f.port.unwrap_or(0));
		self.world.teardown_flow(flow)
	}

	/// Requests a QoS modification of an existing flow via
	/// [`crate::engine::Engine::modify_flow_at`]: delegates the
	/// accept/deny decision (and any pre-emption fallback) to the
	/// admission policy, and on acceptance updates the flow in place and
	/// emits the lifecycle `MODIFICATION` trace (spec §4.3 `modify_qos`,
	/// §4.6 `check_modification`).
	fn on_modify_flow(&mut self, flow_id: crate::ids::FlowId, new_qci: u8, new_gbr: u64, new_mbr: u64) -> SimResult<()> {
		if !self.world.flow(flow_id).alive {
			return Ok(());
		}
		let now = self.engine.now();
		let old_qci = self.world.flow(flow_id).qci;
		let num_rbs = self.engine.num_rbs();
		let mut ctx = AdmissionCtx {
			world: &mut self.world,
			amc: &self.amc,
			preemption: self.preemption.as_ref(),
			trace: &mut self.trace,
			now,
			num_rbs,
		};
		if self.admission.check_modification(&mut ctx, flow_id, new_qci, new_gbr, new_mbr)? {
			let flow = self.world.flow_mut(flow_id);
			flow.modify_qos(new_qci, new_gbr, new_mbr);
			let (imsi, bid, port) = {
				let flow = self.world.flow(flow_id);
				(self.world.terminal(flow.terminal).imsi, flow.bid, flow.port.unwrap_or(0))
			};
			self.trace.lifecycle_modification(now, imsi, bid, old_qci, new_qci, port);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{ApplicationSpec, TerminalSpec};
	use crate::rng::DistributionSpec;

	fn cbr_scenario() -> ScenarioConfig {
		let mut cfg = ScenarioConfig::default();
		cfg.num_rbs = 50;
		cfg.rtx_threshold = 0.1;
		cfg.seed = 1;
		cfg.stop_time_ms = 20_000;
		cfg.terminals.push(TerminalSpec { imsi: 1, name: "ue1".into(), mcs: 8, queue_capacity: 10_000 });
		cfg.applications.push(ApplicationSpec {
			name: "cbr".into(),
			terminal_imsi: 1,
			packet_size: DistributionSpec::Constant { value: 750.0 },
			packet_interval: DistributionSpec::Constant { value: 0.01 },
			session_packets: DistributionSpec::Constant { value: 1_000_000.0 },
			session_interval: DistributionSpec::Constant { value: 0.0 },
			start_time_ms: 5_000,
			stop_time_ms: 15_000,
			dedicated: false,
		});
		cfg
	}

	#[test]
	fn s1_pure_cbr_emits_exactly_1000_tx_lines() {
		let cfg = cbr_scenario();
		let mut sim = Simulation::build_buffered(cfg).unwrap();
		sim.run().unwrap();

		let tx_count = sim.trace.traffic_lines().unwrap().iter().filter(|l| l.contains(" TX ")).count();
		assert_eq!(tx_count, 1000);
	}

	#[test]
	fn default_flow_persists_to_simulation_end() {
		let cfg = cbr_scenario();
		let mut sim = Simulation::build_buffered(cfg).unwrap();
		sim.run().unwrap();
		let terminal = sim.world.terminal(TerminalId(0));
		assert!(sim.world.flow(terminal.default_flow).alive);
	}

	#[test]
	fn deterministic_given_same_seed_and_scenario() {
		let cfg = cbr_scenario();
		let mut a = Simulation::build_buffered(cfg.clone()).unwrap();
		a.run().unwrap();
		let mut b = Simulation::build_buffered(cfg).unwrap();
		b.run().unwrap();
		assert_eq!(a.trace.traffic_lines().unwrap(), b.trace.traffic_lines().unwrap());
	}

	#[test]
	fn scheduled_modification_updates_the_flow_and_traces_it() {
		let cfg = cbr_scenario();
		let mut sim = Simulation::build_buffered(cfg).unwrap();
		let terminal_id = TerminalId(0);
		let default_flow = sim.world.terminal(terminal_id).default_flow;

		sim.schedule_modify_flow(Time::from_millis(1), default_flow, 9, 0, 5_000_000).unwrap();
		sim.run().unwrap();

		assert_eq!(sim.world.flow(default_flow).mbr, 5_000_000);
		let lifecycle = sim.trace.lifecycle_lines().unwrap();
		assert!(lifecycle.iter().any(|l| l.contains("MODIFICATION") && l.contains("NEW_QCI 9")));
	}

	#[test]
	fn dedicated_flow_admission_runs_100ms_before_start_time() {
		let mut cfg = cbr_scenario();
		cfg.applications[0].dedicated = true;
		cfg.applications[0].start_time_ms = 5_000;

		let mut sim = Simulation::build_buffered(cfg).unwrap();
		sim.run().unwrap();

		let lifecycle = sim.trace.lifecycle_lines().unwrap();
		let activation = lifecycle.iter().find(|l| l.contains("ACTIVATION")).unwrap();
		assert!(activation.starts_with("4.900000 "), "expected activation at t=4.9s, got: {activation}");
	}
}
