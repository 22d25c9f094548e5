// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The event-loop mechanism: a stable time-ordered queue, the RNG oracle,
//! and the packet-id counter (spec §4.1). Dispatch *meaning* — what each
//! [`SimEvent`] does to the world — lives in
//! [`crate::simulation::Simulation`], which owns the arenas and policies an
//! event handler needs; this module only owns the scheduling mechanism, per
//! spec Design Notes §9's split between the engine and the arenas it used
//! to own directly.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::{SimError, SimResult};
use crate::ids::{AppId, FlowId, TerminalId};
use crate::rng::RngOracle;
use crate::time::Time;

/// A closed sum of every event kind the simulation dispatches, replacing the
/// source's callable+args tuple (spec Design Notes §9 "Event dispatch
/// generality").
#[derive(Debug, Clone)]
pub enum SimEvent {
	SchedulerTick,
	CreateApp { app: AppId },
	StartApp { app: AppId },
	StopApp { app: AppId },
	GeneratePacket { app: AppId },
	DeliverPacket { app: AppId, pid: u64, wire_bytes: u64 },
	#[allow(clippy::too_many_arguments)]
	ActivateFlow { terminal: TerminalId, app: AppId, qci: u8, gbr: u64, mbr: u64, pvi: bool, pci: bool, arp: u32 },
	DeactivateFlow { terminal: TerminalId, flow: FlowId },
	ModifyFlow { flow: FlowId, qci: u8, gbr: u64, mbr: u64 },
	EndSimulation,
}

struct QueuedEvent {
	time: Time,
	seq: u64,
	event: SimEvent,
}

impl PartialEq for QueuedEvent {
	fn eq(&self, other: &Self) -> bool {
		self.time == other.time && self.seq == other.seq
	}
}
impl Eq for QueuedEvent {}
impl PartialOrd for QueuedEvent {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for QueuedEvent {
	fn cmp(&self, other: &Self) -> Ordering {
		(self.time, self.seq).cmp(&(other.time, other.seq))
	}
}

/// Outcome of a completed `run()`, carried back to the caller (and the CLI)
/// instead of being logged and discarded (spec §4.1 Ambient).
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
	pub dispatched: u64,
	pub final_time: Time,
}

/// The stable min-priority-queue event loop mechanism (spec §4.1, §5). Owns
/// nothing about the simulated world: no `World`, no policies, no trace
/// sinks — those belong to [`crate::simulation::Simulation`].
pub struct Engine {
	now: Time,
	stop_time: Time,
	num_rbs: u32,
	queue: BinaryHeap<Reverse<QueuedEvent>>,
	seq: u64,
	rng: RngOracle,
	next_packet_id: u64,
}

impl Engine {
	pub fn new(stop_time: Time, num_rbs: u32, seed: u64, rtx_threshold: f64) -> Self {
		Engine {
			now: Time::ZERO,
			stop_time,
			num_rbs,
			queue: BinaryHeap::new(),
			seq: 0,
			rng: RngOracle::new(seed, rtx_threshold),
			next_packet_id: 0,
		}
	}

	pub fn now(&self) -> Time {
		self.now
	}

	pub fn stop_time(&self) -> Time {
		self.stop_time
	}

	pub fn num_rbs(&self) -> u32 {
		self.num_rbs
	}

	/// Inserts `event` at `time`, FIFO-ordered against any other event
	/// already scheduled at the same `time` (spec §5).
	pub fn schedule(&mut self, time: Time, event: SimEvent) -> SimResult<()> {
		if time < self.now {
			return Err(SimError::ScheduledInPast { now: self.now, requested: time });
		}
		let seq = self.seq;
		self.seq += 1;
		self.queue.push(Reverse(QueuedEvent { time, seq, event }));
		Ok(())
	}

	/// Pops the smallest-time event and advances `now` to it. Returns
	/// `None` once the queue is empty.
	pub fn pop(&mut self) -> Option<(Time, SimEvent)> {
		let Reverse(queued) = self.queue.pop()?;
		self.now = queued.time;
		Some((queued.time, queued.event))
	}

	#[allow(clippy::too_many_arguments)]
	pub fn activate_flow_at(
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
		self.schedule(time, SimEvent::ActivateFlow { terminal, app, qci, gbr, mbr, pvi, pci, arp })
	}

	pub fn deactivate_flow_at(&mut self, time: Time, terminal: TerminalId, flow: FlowId) -> SimResult<()> {
		self.schedule(time, SimEvent::DeactivateFlow { terminal, flow })
	}

	/// Schedules a QoS modification request against an existing flow
	/// (spec §4.3 `modify_qos`); the acceptance decision and trace are
	/// produced by the admission policy when the event dispatches.
	pub fn modify_flow_at(&mut self, time: Time, flow: FlowId, qci: u8, gbr: u64, mbr: u64) -> SimResult<()> {
		self.schedule(time, SimEvent::ModifyFlow { flow, qci, gbr, mbr })
	}

	/// Resolves a named distribution and draws from it (spec §4.1
	/// `random`). When `as_time` is set, the draw is interpreted as
	/// seconds and converted to milliseconds.
	pub fn random(&mut self, dist_name: &str, args: &[f64], as_time: bool) -> SimResult<f64> {
		let value = self.rng.sample_named(dist_name, args)?;
		Ok(if as_time { (value.max(0.0) * 1000.0).round() } else { value })
	}

	pub fn tx_success(&mut self) -> bool {
		self.rng.tx_success()
	}

	/// Direct access to the RNG oracle for callers (the scheduler policy)
	/// that need `RngOracle`'s typed API rather than the stringly-named
	/// `random` entry point.
	pub fn rng_mut(&mut self) -> &mut RngOracle {
		&mut self.rng
	}

	pub fn next_packet_id(&mut self) -> u64 {
		let id = self.next_packet_id;
		self.next_packet_id += 1;
		id
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn events_dispatch_in_non_decreasing_time_order() {
		let mut engine = Engine::new(Time::from_millis(1000), 50, 1, 0.1);
		engine.schedule(Time::from_millis(5), SimEvent::SchedulerTick).unwrap();
		engine.schedule(Time::from_millis(1), SimEvent::SchedulerTick).unwrap();
		engine.schedule(Time::from_millis(3), SimEvent::SchedulerTick).unwrap();

		let mut times = Vec::new();
		while let Some((t, _)) = engine.pop() {
			times.push(t.as_millis());
		}
		assert_eq!(times, vec![1, 3, 5]);
	}

	#[test]
	fn equal_times_dispatch_fifo() {
		let mut engine = Engine::new(Time::from_millis(1000), 50, 1, 0.1);
		engine.schedule(Time::ZERO, SimEvent::StartApp { app: AppId(1) }).unwrap();
		engine.schedule(Time::ZERO, SimEvent::StartApp { app: AppId(2) }).unwrap();
		engine.schedule(Time::ZERO, SimEvent::StartApp { app: AppId(3) }).unwrap();

		let mut order = Vec::new();
		while let Some((_, event)) = engine.pop() {
			if let SimEvent::StartApp { app } = event {
				order.push(app.index());
			}
		}
		assert_eq!(order, vec![1, 2, 3]);
	}

	#[test]
	fn scheduling_in_the_past_is_an_error() {
		let mut engine = Engine::new(Time::from_millis(1000), 50, 1, 0.1);
		engine.schedule(Time::from_millis(10), SimEvent::SchedulerTick).unwrap();
		engine.pop();
		assert!(matches!(
			engine.schedule(Time::from_millis(5), SimEvent::SchedulerTick),
			Err(SimError::ScheduledInPast { .. })
		));
	}

	#[test]
	fn random_constant_as_time_converts_seconds_to_millis() {
		let mut engine = Engine::new(Time::from_millis(1000), 50, 1, 0.1);
		let ms = engine.random("constant", &[0.25], true).unwrap();
		assert_eq!(ms, 250.0);
	}

	#[test]
	fn unknown_distribution_is_an_error() {
		let mut engine = Engine::new(Time::from_millis(1000), 50, 1, 0.1);
		assert!(matches!(engine.random("gaussian", &[], false), Err(SimError::UnknownDistribution { .. })));
	}

	#[test]
	fn packet_ids_are_monotonic() {
		let mut engine = Engine::new(Time::from_millis(1000), 50, 1, 0.1);
		assert_eq!(engine.next_packet_id(), 0);
		assert_eq!(engine.next_packet_id(), 1);
		assert_eq!(engine.next_packet_id(), 2);
	}
}
