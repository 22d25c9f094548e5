// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use thiserror::Error;

use crate::time::Time;

/// Fatal errors raised by the simulation core.
///
/// All variants here are programming or configuration errors: there is no
/// recovery path and a run that raises one should abort. Admission denial
/// and pre-emption failure are *not* errors; they are normal results
/// returned from policy calls and logged as trace lines.
#[derive(Debug, Error)]
pub enum SimError {
	#[error("event scheduled at {requested} precedes current time {now}")]
	ScheduledInPast { now: Time, requested: Time },

	#[error("application {app} emitted a packet with no flow bound")]
	NoFlowBound { app: u64 },

	#[error("unknown distribution: {name}")]
	UnknownDistribution { name: String },

	#[error("terminal {imsi} already has the maximum of 10 dedicated flows")]
	TooManyFlows { imsi: u64 },

	#[error("attempted to tear down the default flow of terminal {imsi}")]
	DefaultFlowTeardown { imsi: u64 },

	#[error("cannot rebind application to a flow owned by a different terminal")]
	MismatchedTerminalOnRebind,

	#[error("terminal {imsi} has exhausted its dedicated-flow port range")]
	PortExhausted { imsi: u64 },

	#[error("application references unknown terminal imsi {imsi}")]
	UnknownTerminal { imsi: u64 },

	#[error("qci {qci} out of range, must be 1..=9")]
	InvalidQci { qci: u8 },

	#[error("failed to parse scenario configuration")]
	Config(#[from] serde_json::Error),

	#[error("trace sink I/O failure")]
	Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_variant_has_a_non_empty_display_message() {
		let samples: Vec<SimError> = vec![
			SimError::ScheduledInPast { now: Time::from_millis(5), requested: Time::from_millis(1) },
			SimError::NoFlowBound { app: 1 },
			SimError::UnknownDistribution { name: "bogus".into() },
			SimError::TooManyFlows { imsi: 1 },
			SimError::DefaultFlowTeardown { imsi: 1 },
			SimError::MismatchedTerminalOnRebind,
			SimError::PortExhausted { imsi: 1 },
			SimError::UnknownTerminal { imsi: 1 },
			SimError::InvalidQci { qci: 0 },
		];
		for err in samples {
			assert!(!err.to_string().is_empty());
		}
	}
}
