// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

/// The adaptive-modulation-and-coding oracle.
///
/// Stands in for the real 3GPP transport-block-size table, which is out of
/// scope for this simulator (spec §1): a closed-form, monotonic-in-`mcs`
/// formula is used instead so the oracle is internally consistent and its
/// inverse (`rbs_for_rate`) is exact.
pub struct AmcTable;

impl AmcTable {
	pub const MIN_MCS: u8 = 0;
	pub const MAX_MCS: u8 = 28;

	pub fn new() -> Self {
		AmcTable
	}

	fn base_bytes_per_rb(mcs: u8) -> u64 {
		6 + mcs as u64 * 3
	}

	/// Bytes deliverable by `n_rbs` resource blocks at modulation/coding
	/// index `mcs`.
	pub fn tbs(&self, mcs: u8, n_rbs: u32) -> u64 {
		Self::base_bytes_per_rb(mcs) * n_rbs as u64
	}

	/// Resource blocks per second needed to sustain `rate_bps` at `mcs`.
	/// Returns `(false, sentinel)` when `mcs` is out of range, where the
	/// sentinel always exceeds any realistic per-second RB budget so that
	/// admission checks deny by default on a lookup miss (spec §4.6).
	pub fn rbs_for_rate(&self, mcs: u8, rate_bps: u64, num_rbs: u32) -> (bool, u64) {
		if mcs > Self::MAX_MCS {
			return (false, num_rbs as u64 * 1000 + 1);
		}
		let bytes_per_s = rate_bps as f64 / 8.0;
		let per_rb = Self::base_bytes_per_rb(mcs) as f64;
		let rbs = (bytes_per_s / per_rb).ceil() as u64;
		(true, rbs)
	}
}

impl Default for AmcTable {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tbs_scales_linearly_with_rb_count() {
		let amc = AmcTable::new();
		assert_eq!(amc.tbs(8, 1) * 10, amc.tbs(8, 10));
	}

	#[test]
	fn tbs_increases_with_mcs() {
		let amc = AmcTable::new();
		assert!(amc.tbs(0, 1) < amc.tbs(28, 1));
	}

	#[test]
	fn rbs_for_rate_out_of_range_mcs_is_sentinel() {
		let amc = AmcTable::new();
		let (found, count) = amc.rbs_for_rate(29, 1_000_000, 50);
		assert!(!found);
		assert_eq!(count, 50_001);
	}

	#[test]
	fn rbs_for_rate_round_trips_through_tbs_per_second() {
		let amc = AmcTable::new();
		let (found, rbs_per_s) = amc.rbs_for_rate(8, 240_000, 50);
		assert!(found);
		// tbs(mcs, rbs_per_s) bytes/sec should cover the requested bits/sec.
		let bytes_per_s = amc.tbs(8, rbs_per_s as u32);
		assert!(bytes_per_s * 8 >= 240_000);
	}
}
