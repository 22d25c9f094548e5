// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The per-1ms-interval resource-block allocator and HARQ retransmission
//! pipeline (spec §4.2). Grounded on
//! `original_source/qppsim/scheduler/SchedulerBase.py` and
//! `SchedulerRoundRobin.py`.

use std::collections::BTreeMap;

use crate::amc::AmcTable;
use crate::error::SimResult;
use crate::flow::DeliveryInfo;
use crate::ids::FlowId;
use crate::rng::RngOracle;
use crate::time::Time;
use crate::trace::TraceSinks;
use crate::world::World;

/// Milliseconds between the last byte of a packet leaving the scheduler and
/// the owning application being notified of delivery.
pub const TX_DELAY: u64 = 4;

/// Milliseconds between a failed transmission (fresh or retry) and the next
/// retry attempt.
pub const RTX_DELAY: u64 = 8;

/// The narrow facade a scheduler policy operates through; the QoS-monitor
/// gating (spec §4.2 step 2) and the tick's own self-rescheduling (step 1)
/// are orchestration-level concerns handled by the caller, not the policy.
pub struct SchedulerCtx<'a> {
	pub world: &'a mut World,
	pub amc: &'a AmcTable,
	pub rng: &'a mut RngOracle,
	pub trace: &'a mut TraceSinks,
	pub now: Time,
	pub num_rbs: u32,
}

/// Allocates the RB pool for one 1 ms interval and drives HARQ (spec §4.2
/// steps 3-5). Returns the deliveries to schedule, each already offset by
/// [`TX_DELAY`].
pub trait SchedulerPolicy: Send {
	fn run_interval(&mut self, ctx: &mut SchedulerCtx) -> SimResult<Vec<(Time, DeliveryInfo)>>;
}

struct RtxEntry {
	flow: FlowId,
	rbs: u32,
	tbs: u64,
	attempt: u8,
}

/// Round-robin baseline, grounded on `SchedulerRoundRobin.py`. The source
/// keys `rtx_pending` by `(time, terminal, flow_id)`; this port keys only by
/// time since `FlowId` alone already identifies the owning terminal via the
/// world arena.
pub struct RoundRobin {
	cursor: Option<FlowId>,
	rtx_pending: BTreeMap<u64, Vec<RtxEntry>>,
}

impl RoundRobin {
	pub fn new() -> Self {
		RoundRobin { cursor: None, rtx_pending: BTreeMap::new() }
	}

	/// Processes every retry due at exactly `ctx.now`, consuming its RBs
	/// from `budget` first (spec §4.2: "retries get first claim on the
	/// pool"). An entry whose flow was torn down in the meantime is
	/// silently dropped.
	fn process_due_retries(&mut self, ctx: &mut SchedulerCtx, budget: &mut u32, deliveries: &mut Vec<(Time, DeliveryInfo)>) {
		let Some(due) = self.rtx_pending.remove(&ctx.now.as_millis()) else { return };
		for entry in due {
			*budget = budget.saturating_sub(entry.rbs);
			if !ctx.world.flow(entry.flow).alive {
				continue;
			}
			// The 4th attempt (stored value 4) is forced successful, no draw.
			let success = entry.attempt == 4 || ctx.rng.tx_success();
			if success {
				let delivered = ctx.world.flow_mut(entry.flow).retransmit(entry.tbs, ctx.now);
				deliveries.extend(delivered.into_iter().map(|d| (ctx.now + TX_DELAY, d)));
			} else {
				self.rtx_pending.entry(ctx.now.as_millis() + RTX_DELAY).or_default().push(RtxEntry {
					flow: entry.flow,
					rbs: entry.rbs,
					tbs: entry.tbs,
					attempt: entry.attempt + 1,
				});
			}
		}
	}

	/// Round-robin assignment of the remaining budget, one RB at a time,
	/// to flows with unclaimed pending bytes (spec §4.2 step 4). Returns
	/// the RBs handed to each flow this interval, in allocation order.
	fn allocate_fresh(&mut self, ctx: &SchedulerCtx, budget: &mut u32) -> BTreeMap<FlowId, u32> {
		let order = ctx.world.ordered_alive_flows();
		let mut given: BTreeMap<FlowId, u32> = BTreeMap::new();
		let n = order.len();
		if n == 0 {
			return given;
		}

		let mut idx = match self.cursor {
			Some(c) => order.iter().position(|&f| f == c).map(|i| (i + 1) % n).unwrap_or(0),
			None => 0,
		};
		let mut idle_streak = 0;
		while *budget > 0 && idle_streak < n {
			let flow_id = order[idx];
			let mcs = ctx.world.terminal(ctx.world.flow(flow_id).terminal).mcs;
			let rbs_so_far = *given.get(&flow_id).unwrap_or(&0);
			let bytes_so_far = ctx.amc.tbs(mcs, rbs_so_far);
			let pending = ctx.world.flow(flow_id).pending_size();
			if pending > bytes_so_far {
				*given.entry(flow_id).or_insert(0) += 1;
				*budget -= 1;
				self.cursor = Some(flow_id);
				idle_streak = 0;
			} else {
				idle_streak += 1;
			}
			idx = (idx + 1) % n;
		}
		given
	}

	/// Resolves each flow's fresh allocation through the AMC oracle and
	/// either commits the transmission or starts its HARQ pipeline (spec
	/// §4.2 step 5).
	fn resolve_allocations(&mut self, ctx: &mut SchedulerCtx, given: BTreeMap<FlowId, u32>, deliveries: &mut Vec<(Time, DeliveryInfo)>) {
		for (flow_id, rbs) in given {
			let mcs = ctx.world.terminal(ctx.world.flow(flow_id).terminal).mcs;
			let tbs = ctx.amc.tbs(mcs, rbs);
			if ctx.rng.tx_success() {
				let delivered = ctx.world.flow_mut(flow_id).transmit(tbs, false, ctx.now);
				deliveries.extend(delivered.into_iter().map(|d| (ctx.now + TX_DELAY, d)));
			} else {
				ctx.world.flow_mut(flow_id).transmit(tbs, true, ctx.now);
				self.rtx_pending.entry(ctx.now.as_millis() + RTX_DELAY).or_default().push(RtxEntry {
					flow: flow_id,
					rbs,
					tbs,
					attempt: 1,
				});
			}
		}
	}
}

impl Default for RoundRobin {
	fn default() -> Self {
		Self::new()
	}
}

impl SchedulerPolicy for RoundRobin {
	fn run_interval(&mut self, ctx: &mut SchedulerCtx) -> SimResult<Vec<(Time, DeliveryInfo)>> {
		let mut budget = ctx.num_rbs;
		let mut deliveries = Vec::new();

		self.process_due_retries(ctx, &mut budget, &mut deliveries);
		let given = self.allocate_fresh(ctx, &mut budget);
		self.resolve_allocations(ctx, given, &mut deliveries);

		Ok(deliveries)
	}
}
