// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use crate::ids::{FlowId, TerminalId};
use crate::rng::Distribution;
use crate::time::Time;

/// A self-scheduling packet generator bound to one flow at a time.
pub struct Application {
	pub name: String,
	pub terminal: TerminalId,
	pub packet_size: Distribution,
	pub packet_interval: Distribution,
	pub session_packets: Distribution,
	pub session_interval: Distribution,
	pub start_time: Time,
	pub stop_time: Time,
	/// Whether admission should request a dedicated flow for this
	/// application, carried from `ApplicationSpec::dedicated` so
	/// `on_create_app` can bind without threading the scenario config
	/// through the event queue.
	pub dedicated: bool,
	pub bound_flow: Option<FlowId>,
	pub active: bool,
	pub session_remaining: u64,
}

impl Application {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		name: String,
		terminal: TerminalId,
		packet_size: Distribution,
		packet_interval: Distribution,
		session_packets: Distribution,
		session_interval: Distribution,
		start_time: Time,
		stop_time: Time,
		dedicated: bool,
	) -> Self {
		Application {
			name,
			terminal,
			packet_size,
			packet_interval,
			session_packets,
			session_interval,
			start_time,
			stop_time,
			dedicated,
			bound_flow: None,
			active: false,
			session_remaining: 0,
		}
	}
}
