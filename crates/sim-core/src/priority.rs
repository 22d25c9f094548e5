// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use crate::terminal::Terminal;

/// `(gbr, mbr, qci, arp, pvi, pci)` assigned to a dedicated flow request.
pub type Priority = (u64, u64, u8, u32, bool, bool);

/// Decides the QoS priority of a newly-requested dedicated flow (spec
/// §4.5). Given a trait rather than a fixed tuple because a scenario may
/// want per-application-name policies in the future, even though the one
/// implementation here is name-agnostic.
pub trait PriorityPolicy: Send {
	fn get_priority(&self, terminal: &Terminal, app_name: &str) -> Priority;
}

/// A fixed priority for every application, grounded on
/// `original_source/qppsim/prioritypolicy/PriorityPolicySample.py`, which
/// likewise ignores the UE and application and returns one constant tuple.
pub struct Sample {
	pub gbr: u64,
	pub mbr: u64,
	pub qci: u8,
	pub arp: u32,
	pub pvi: bool,
	pub pci: bool,
}

impl Sample {
	pub fn new(gbr: u64, mbr: u64, qci: u8, arp: u32, pvi: bool, pci: bool) -> Self {
		debug_assert!(gbr <= mbr, "gbr must be below mbr");
		Sample { gbr, mbr, qci, arp, pvi, pci }
	}
}

impl Default for Sample {
	fn default() -> Self {
		Sample::new(1_000_000, 2_000_000, 2, 10, true, false)
	}
}

impl PriorityPolicy for Sample {
	fn get_priority(&self, _terminal: &Terminal, _app_name: &str) -> Priority {
		(self.gbr, self.mbr, self.qci, self.arp, self.pvi, self.pci)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ids::FlowId;

	#[test]
	fn sample_returns_the_fixed_tuple_regardless_of_app() {
		let policy = Sample::default();
		let terminal = Terminal::new(1, "ue1".into(), 8, 10_000, FlowId(0));
		assert_eq!(policy.get_priority(&terminal, "voip"), (1_000_000, 2_000_000, 2, 10, true, false));
		assert_eq!(policy.get_priority(&terminal, "video"), (1_000_000, 2_000_000, 2, 10, true, false));
	}
}
