// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::collections::BTreeMap;

use crate::amc::AmcTable;
use crate::error::SimResult;
use crate::ids::FlowId;
use crate::preemption::PreemptionPolicy;
use crate::qci;
use crate::time::Time;
use crate::trace::TraceSinks;
use crate::world::World;

/// Per-flow aggregate observed over the last second, compared against the
/// flow's QCI class target (spec §4.8).
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowQos {
	pub throughput_sum: u64,
	pub loss_sum: u64,
	pub loss_pct: f64,
	pub max_delay_ms: u64,
}

/// The narrow facade the QoS monitor operates through, invoked by the
/// scheduler at most once per `qos_monitor_interval` (spec §4.2 step 2).
pub struct QosMonitorCtx<'a> {
	pub world: &'a mut World,
	pub amc: &'a AmcTable,
	pub preemption: &'a dyn PreemptionPolicy,
	pub trace: &'a mut TraceSinks,
	pub now: Time,
	pub num_rbs: u32,
	/// Window, in whole seconds, used only for the detailed min/avg/max/last
	/// trace stats; the accept/violate decision always uses the true
	/// last-second slice, matching the original's wording exactly.
	pub stats_window_s: u64,
	pub trace_qos: bool,
	pub preempt_qos: bool,
}

/// Aggregates per-flow QoS metrics and, when enabled, triggers at most one
/// pre-emption per invocation (spec §4.8). Grounded on
/// `original_source/qppsim/qosmonitor/QosMonitorBase.py` and
/// `QosMonitorDefault.py`.
pub trait QosMonitorPolicy: Send {
	fn evaluate(&self, ctx: &mut QosMonitorCtx) -> SimResult<BTreeMap<FlowId, FlowQos>>;
}

fn min_avg_max_last(values: &BTreeMap<u64, u64>) -> (f64, f64, f64, f64) {
	if values.is_empty() {
		return (0.0, 0.0, 0.0, 0.0);
	}
	let min = *values.values().min().unwrap() as f64;
	let max = *values.values().max().unwrap() as f64;
	let avg = values.values().sum::<u64>() as f64 / values.len() as f64;
	let last = *values.values().next_back().unwrap() as f64;
	(min, avg, max, last)
}

/// Default aggregation policy, grounded on `QosMonitorDefault.py`: traces
/// min/avg/max/last when `trace_qos` is set, and pre-empts at most one
/// violating flow per call when `preempt_qos` is set.
pub struct DefaultQosMonitor;

impl QosMonitorPolicy for DefaultQosMonitor {
	fn evaluate(&self, ctx: &mut QosMonitorCtx) -> SimResult<BTreeMap<FlowId, FlowQos>> {
		let mut stats = BTreeMap::new();
		let mut preempted_this_call = false;

		for flow_id in ctx.world.ordered_alive_flows() {
			let (throughput_sum, loss_sum, loss_pct, max_delay_ms) = {
				let flow = ctx.world.flow_mut(flow_id);
				flow.last_second_summary(ctx.now)
			};
			stats.insert(flow_id, FlowQos { throughput_sum, loss_sum, loss_pct, max_delay_ms });

			if ctx.trace_qos {
				let window = ctx.world.flow_mut(flow_id).metrics(ctx.now, ctx.stats_window_s);
				let throughput = min_avg_max_last(&window.throughput);
				let loss = min_avg_max_last(&window.loss);
				let delay = min_avg_max_last(&window.age_ms);
				let loss_pct_series: BTreeMap<u64, u64> = window
					.throughput
					.keys()
					.map(|&sec| {
						let t = *window.throughput.get(&sec).unwrap_or(&0);
						let l = *window.loss.get(&sec).unwrap_or(&0);
						let pct = if t + l == 0 { 0.0 } else { l as f64 / (l + t) as f64 };
						(sec, (pct * 1_000_000.0) as u64)
					})
					.collect();
				let loss_pct_stats = min_avg_max_last(&loss_pct_series);
				let loss_pct_stats = (
					loss_pct_stats.0 / 1_000_000.0,
					loss_pct_stats.1 / 1_000_000.0,
					loss_pct_stats.2 / 1_000_000.0,
					loss_pct_stats.3 / 1_000_000.0,
				);

				let flow = ctx.world.flow(flow_id);
				let imsi = ctx.world.terminal(flow.terminal).imsi;
				let limits = qci::limits(flow.qci);
				ctx.trace.qos_line(
					ctx.now,
					imsi,
					flow.bid,
					throughput,
					loss,
					loss_pct_stats,
					delay,
					limits.max_error_rate,
					limits.max_delay_ms,
				);
			}

			if ctx.preempt_qos && !preempted_this_call {
				let flow = ctx.world.flow(flow_id);
				let limits = qci::limits(flow.qci);
				let violates = loss_pct > limits.max_error_rate || max_delay_ms > limits.max_delay_ms;
				if violates {
					let arp = flow.arp;
					let (success, victims) =
						ctx.preemption.qos_preemption(ctx.world, ctx.amc, ctx.trace, ctx.now, ctx.num_rbs, arp);
					if success {
						preempted_this_call = true;
						let victim = victims[0];
						let v = ctx.world.flow(victim);
						let v_imsi = ctx.world.terminal(v.terminal).imsi;
						ctx.trace.admission_line(
							ctx.now,
							"DEACTIVATION",
							v_imsi,
							&format!("BID {} QCI {} GBR {} ARP {} PVI {} PCI {}", v.bid, v.qci, v.gbr, v.arp, v.pvi, v.pci),
						);
						ctx.world.teardown_flow(victim)?;
					}
				}
			}
		}

		Ok(stats)
	}
}

/// Collects no metrics and never pre-empts, grounded on
/// `original_source/qppsim/qosmonitor/QosMonitorDummy.py`.
pub struct Dummy;

impl QosMonitorPolicy for Dummy {
	fn evaluate(&self, _ctx: &mut QosMonitorCtx) -> SimResult<BTreeMap<FlowId, FlowQos>> {
		Ok(BTreeMap::new())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::preemption::PreemptAll;

	#[test]
	fn evaluate_reports_one_entry_per_alive_flow() {
		let mut world = World::new();
		world.add_terminal(1, "ue1".into(), 8, 10_000, 9, 15, 0);
		let amc = AmcTable::new();
		let preemption = PreemptAll;
		let mut trace = TraceSinks::buffered();
		let mut ctx = QosMonitorCtx {
			world: &mut world,
			amc: &amc,
			preemption: &preemption,
			trace: &mut trace,
			now: Time::from_millis(1000),
			num_rbs: 50,
			stats_window_s: 1,
			trace_qos: false,
			preempt_qos: false,
		};
		let stats = DefaultQosMonitor.evaluate(&mut ctx).unwrap();
		assert_eq!(stats.len(), 1);
	}

	#[test]
	fn preempts_at_most_once_per_call() {
		let mut world = World::new();
		let (t, _) = world.add_terminal(1, "ue1".into(), 8, 10_000, 9, 15, 0);
		let bad1 = world.add_dedicated_flow(t, 1, 1000, 1000, false, false, 1).unwrap();
		let bad2 = world.add_dedicated_flow(t, 1, 1000, 1000, false, false, 1).unwrap();
		let victim = world.add_dedicated_flow(t, 2, 1000, 1000, true, false, 20).unwrap();
		// Force both bad flows over their delay budget: created just inside
		// the 1s window (cutoff = 199s) but already 500ms old, which exceeds
		// qci=1's 100ms max_delay_ms.
		let now = Time::from_millis(200_000);
		let created = Time::from_millis(199_500);
		for id in [bad1, bad2] {
			let flow = world.flow_mut(id);
			flow.enqueue(crate::packet::Packet::new(1, 10, created, crate::ids::AppId(0)), created);
		}
		let amc = AmcTable::new();
		let preemption = PreemptAll;
		let mut trace = TraceSinks::buffered();
		let mut ctx = QosMonitorCtx {
			world: &mut world,
			amc: &amc,
			preemption: &preemption,
			trace: &mut trace,
			now,
			num_rbs: 50,
			stats_window_s: 1,
			trace_qos: false,
			preempt_qos: true,
		};
		DefaultQosMonitor.evaluate(&mut ctx).unwrap();
		assert!(!world.flow(victim).alive);
	}
}
