// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::time::Time;

/// A named random-distribution descriptor, resolved at scenario-load time
/// from a `(name, args)` pair (the oracle interface named in the spec) into
/// this closed enum so that an unknown name fails fast with
/// [`SimError::UnknownDistribution`] rather than at every draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
	/// Always returns `args[0]` unmodified.
	Constant(f64),
	Uniform { lo: f64, hi: f64 },
	Exponential { mean: f64 },
}

/// Wire format for a distribution inside a scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "lowercase")]
pub enum DistributionSpec {
	Constant { value: f64 },
	Uniform { lo: f64, hi: f64 },
	Exponential { mean: f64 },
}

impl TryFrom<&DistributionSpec> for Distribution {
	type Error = SimError;

	fn try_from(spec: &DistributionSpec) -> SimResult<Distribution> {
		Ok(match spec {
			DistributionSpec::Constant { value } => Distribution::Constant(*value),
			DistributionSpec::Uniform { lo, hi } => Distribution::Uniform { lo: *lo, hi: *hi },
			DistributionSpec::Exponential { mean } => Distribution::Exponential { mean: *mean },
		})
	}
}

/// The RNG oracle: a single deterministically-seeded stream shared by the
/// whole simulation and drawn from only inside event callbacks, so that
/// identical `(seed, scenario)` pairs reproduce byte-identical traces.
pub struct RngOracle {
	rng: StdRng,
	rtx_threshold: f64,
}

impl RngOracle {
	pub fn new(seed: u64, rtx_threshold: f64) -> Self {
		RngOracle { rng: StdRng::seed_from_u64(seed), rtx_threshold }
	}

	/// Draws a raw sample from a resolved distribution.
	pub fn sample(&mut self, dist: &Distribution) -> f64 {
		match dist {
			Distribution::Constant(v) => *v,
			Distribution::Uniform { lo, hi } => self.rng.random_range(*lo..*hi),
			Distribution::Exponential { mean } => {
				// Inverse-transform sampling: -mean * ln(1 - U), U in (0, 1].
				let u: f64 = self.rng.random_range(f64::MIN_POSITIVE..1.0);
				-mean * (1.0 - u).ln()
			}
		}
	}

	/// Draws a sample interpreted as seconds and converts to milliseconds,
	/// matching the engine's `as_time=true` convention.
	pub fn sample_as_time(&mut self, dist: &Distribution) -> Time {
		let seconds = self.sample(dist).max(0.0);
		Time::from_millis((seconds * 1000.0).round() as u64)
	}

	/// True iff a fresh uniform(0,1) draw is at least `rtx_threshold`,
	/// i.e. transmission succeeds with probability `1 - rtx_threshold`.
	pub fn tx_success(&mut self) -> bool {
		let draw: f64 = self.rng.random_range(0.0..1.0);
		draw >= self.rtx_threshold
	}

	/// Resolves and draws a distribution by its stringly-typed name, the
	/// oracle interface `Engine::random` exposes to the rest of the
	/// simulation (spec §4.1, §6). Unlike [`DistributionSpec`] (used for
	/// scenario-file templates), this is the live entrypoint that must
	/// fail on an unrecognized name rather than at deserialization time.
	pub fn sample_named(&mut self, name: &str, args: &[f64]) -> SimResult<f64> {
		let dist = match name {
			"constant" => Distribution::Constant(*args.first().unwrap_or(&0.0)),
			"uniform" => Distribution::Uniform { lo: args[0], hi: args[1] },
			"exponential" => Distribution::Exponential { mean: args[0] },
			other => return Err(SimError::UnknownDistribution { name: other.to_string() }),
		};
		Ok(self.sample(&dist))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn constant_distribution_is_pass_through() {
		let mut rng = RngOracle::new(1, 0.1);
		let dist = Distribution::Constant(750.0);
		assert_eq!(rng.sample(&dist), 750.0);
		assert_eq!(rng.sample(&dist), 750.0);
	}

	#[test]
	fn same_seed_same_sequence() {
		let mut a = RngOracle::new(42, 0.1);
		let mut b = RngOracle::new(42, 0.1);
		let dist = Distribution::Uniform { lo: 0.0, hi: 1.0 };
		for _ in 0..10 {
			assert_eq!(a.sample(&dist), b.sample(&dist));
		}
	}

	#[test]
	fn tx_success_threshold_one_always_fails() {
		let mut rng = RngOracle::new(7, 1.0);
		for _ in 0..50 {
			assert!(!rng.tx_success());
		}
	}

	#[test]
	fn tx_success_threshold_zero_always_succeeds() {
		let mut rng = RngOracle::new(7, 0.0);
		for _ in 0..50 {
			assert!(rng.tx_success());
		}
	}

	#[test]
	fn sample_named_rejects_unknown_distribution() {
		let mut rng = RngOracle::new(1, 0.1);
		assert!(matches!(rng.sample_named("gaussian", &[]), Err(SimError::UnknownDistribution { .. })));
	}

	#[test]
	fn sample_named_constant_matches_closed_enum() {
		let mut rng = RngOracle::new(1, 0.1);
		assert_eq!(rng.sample_named("constant", &[42.0]).unwrap(), 42.0);
	}
}
