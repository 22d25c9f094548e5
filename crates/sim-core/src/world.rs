// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Owns every arena (terminals, flows, applications) and the operations
//! that cut across them (flow teardown, registry ordering, GBR accounting).
//! This is the concrete realization of the "arena ownership with opaque
//! indices" design named in spec Design Notes §9: nothing outside this
//! module ever holds a `&Terminal`/`&Flow`/`&Application` across an event
//! boundary, only the `Copy` ids in [`crate::ids`].

use crate::amc::AmcTable;
use crate::application::Application;
use crate::error::{SimError, SimResult};
use crate::flow::Flow;
use crate::ids::{AppId, FlowId, TerminalId};
use crate::qci;
use crate::terminal::Terminal;

#[derive(Default)]
pub struct World {
	pub terminals: Vec<Terminal>,
	pub flows: Vec<Flow>,
	pub apps: Vec<Application>,
}

impl World {
	pub fn new() -> Self {
		World { terminals: Vec::new(), flows: Vec::new(), apps: Vec::new() }
	}

	pub fn terminal(&self, id: TerminalId) -> &Terminal {
		&self.terminals[id.index()]
	}
	pub fn terminal_mut(&mut self, id: TerminalId) -> &mut Terminal {
		&mut self.terminals[id.index()]
	}
	pub fn flow(&self, id: FlowId) -> &Flow {
		&self.flows[id.index()]
	}
	pub fn flow_mut(&mut self, id: FlowId) -> &mut Flow {
		&mut self.flows[id.index()]
	}
	pub fn app(&self, id: AppId) -> &Application {
		&self.apps[id.index()]
	}
	pub fn app_mut(&mut self, id: AppId) -> &mut Application {
		&mut self.apps[id.index()]
	}

	/// Creates a terminal together with its default (id 1, never torn
	/// down) flow, returning both ids.
	pub fn add_terminal(
		&mut self,
		imsi: u64,
		name: String,
		mcs: u8,
		default_queue_capacity: u64,
		default_qci: u8,
		default_arp: u32,
		default_mbr: u64,
	) -> (TerminalId, FlowId) {
		let flow_id = FlowId(self.flows.len());
		let terminal_id = TerminalId(self.terminals.len());
		self.flows.push(Flow::new(
			terminal_id,
			crate::flow::DEFAULT_FLOW_BID,
			default_qci,
			0,
			default_mbr,
			false,
			false,
			default_arp,
			default_queue_capacity,
			mcs,
			None,
		));
		self.terminals.push(Terminal::new(imsi, name, mcs, default_queue_capacity, flow_id));
		(terminal_id, flow_id)
	}

	pub fn add_application(&mut self, app: Application) -> AppId {
		let id = AppId(self.apps.len());
		self.apps.push(app);
		id
	}

	/// Creates a dedicated flow for `terminal`. The caller (admission
	/// control) has already decided to accept; this only performs the
	/// bookkeeping: bid/port allocation and registry insertion.
	pub fn add_dedicated_flow(
		&mut self,
		terminal_id: TerminalId,
		qci: u8,
		gbr: u64,
		mbr: u64,
		pvi: bool,
		pci: bool,
		arp: u32,
	) -> SimResult<FlowId> {
		let (capacity, mcs, bid, port) = {
			let terminal = self.terminal_mut(terminal_id);
			if terminal.dedicated_count() >= crate::terminal::MAX_DEDICATED_FLOWS {
				return Err(SimError::TooManyFlows { imsi: terminal.imsi });
			}
			let port = terminal.allocate_port()?;
			let bid = terminal.allocate_bid();
			(terminal.default_queue_capacity, terminal.mcs, bid, port)
		};
		let flow_id = FlowId(self.flows.len());
		self.flows.push(Flow::new(terminal_id, bid, qci, gbr, mbr, pvi, pci, arp, capacity, mcs, Some(port)));
		self.terminal_mut(terminal_id).register_dedicated_flow(flow_id)?;
		Ok(flow_id)
	}

	/// Tears down a dedicated flow: disallowed on the default flow,
	/// rebinds any application currently bound to it back onto the
	/// terminal's default flow, and removes it from the registry (spec
	/// §4.3 `teardown`, §4.5 `Terminal::teardown`).
	pub fn teardown_flow(&mut self, flow_id: FlowId) -> SimResult<()> {
		let (terminal_id, is_default, imsi) = {
			let flow = self.flow(flow_id);
			(flow.terminal, flow.is_default(), self.terminal(flow.terminal).imsi)
		};
		if is_default {
			return Err(SimError::DefaultFlowTeardown { imsi });
		}

		let default_flow = self.terminal(terminal_id).default_flow;
		for app_idx in 0..self.apps.len() {
			if self.apps[app_idx].terminal == terminal_id && self.apps[app_idx].bound_flow == Some(flow_id) {
				self.apps[app_idx].bound_flow = Some(default_flow);
			}
		}

		self.terminal_mut(terminal_id).remove_dedicated_flow(flow_id);
		self.flow_mut(flow_id).alive = false;
		Ok(())
	}

	/// Re-binds `app` onto `new_flow` (spec §4.4 `change_flow`), used when
	/// pre-emption or a fresh activation hands an application a different
	/// flow mid-run. Fails with [`SimError::MismatchedTerminalOnRebind`]
	/// if `new_flow` belongs to a different terminal than `app`.
	///
	/// The original's `Application.change_bearer` tears down the
	/// *current* bearer first when its `bid == 1` — i.e. exactly when it
	/// is the default flow, which `Bearer.teardown()` always refuses.
	/// That branch can therefore never complete there either; this port
	/// preserves it verbatim rather than silently inverting the
	/// condition to the presumably-intended "tear down only if current is
	/// dedicated" (spec Design Notes only catalogues four such quirks,
	/// but this one reads the same way: preserved, not fixed).
	pub fn change_flow(&mut self, app_id: AppId, new_flow: FlowId) -> SimResult<()> {
		let terminal_id = self.app(app_id).terminal;
		if self.flow(new_flow).terminal != terminal_id {
			return Err(SimError::MismatchedTerminalOnRebind);
		}
		if let Some(current) = self.app(app_id).bound_flow {
			if self.flow(current).is_default() {
				self.teardown_flow(current)?;
			}
		}
		self.app_mut(app_id).bound_flow = Some(new_flow);
		Ok(())
	}

	/// All currently-alive flows in `(imsi asc, bid asc)` order — the
	/// total order the round-robin scheduler iterates.
	pub fn ordered_alive_flows(&self) -> Vec<FlowId> {
		let mut ids: Vec<FlowId> =
			(0..self.flows.len()).map(FlowId).filter(|id| self.flow(*id).alive).collect();
		ids.sort_by_key(|id| {
			let flow = self.flow(*id);
			(self.terminal(flow.terminal).imsi, flow.bid)
		});
		ids
	}

	/// Total RBs/s currently reserved by GBR (`qci < 5`) flows, per
	/// spec §4.6.
	pub fn used_gbr_rbs(&self, amc: &AmcTable, num_rbs: u32) -> u64 {
		self.flows
			.iter()
			.filter(|f| f.alive && qci::is_gbr(f.qci))
			.map(|f| amc.rbs_for_rate(f.mcs, f.gbr, num_rbs).1)
			.sum()
	}
}
