// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::any::Any;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::SimResult;
use crate::time::Time;

/// One of the five append-only trace streams named in spec §6.
pub trait TraceSink: Send {
	fn write_line(&mut self, line: String);
	fn flush(&mut self);
	fn as_any(&self) -> &dyn Any;
}

/// In-memory sink used by tests so scenario assertions never touch the
/// filesystem.
#[derive(Default)]
pub struct BufferTraceSink {
	pub lines: Vec<String>,
}

impl TraceSink for BufferTraceSink {
	fn write_line(&mut self, line: String) {
		self.lines.push(line);
	}
	fn flush(&mut self) {}
	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// File-backed sink matching `original_source/qppsim/TraceWriter.py`'s
/// one-file-per-stream layout.
pub struct FileTraceSink {
	writer: BufWriter<File>,
}

impl FileTraceSink {
	pub fn create(path: &Path) -> SimResult<Self> {
		Ok(FileTraceSink { writer: BufWriter::new(File::create(path)?) })
	}
}

impl TraceSink for FileTraceSink {
	fn write_line(&mut self, line: String) {
		let _ = writeln!(self.writer, "{line}");
	}
	fn flush(&mut self) {
		let _ = self.writer.flush();
	}
	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// The five trace streams, bundled so the engine can flush all of them at
/// `end_simulation`.
pub struct TraceSinks {
	pub topology: Box<dyn TraceSink>,
	pub traffic: Box<dyn TraceSink>,
	pub lifecycle: Box<dyn TraceSink>,
	pub admission: Box<dyn TraceSink>,
	pub qos: Box<dyn TraceSink>,
}

impl TraceSinks {
	pub fn buffered() -> Self {
		TraceSinks {
			topology: Box::new(BufferTraceSink::default()),
			traffic: Box::new(BufferTraceSink::default()),
			lifecycle: Box::new(BufferTraceSink::default()),
			admission: Box::new(BufferTraceSink::default()),
			qos: Box::new(BufferTraceSink::default()),
		}
	}

	pub fn files(dir: &Path) -> SimResult<Self> {
		std::fs::create_dir_all(dir)?;
		Ok(TraceSinks {
			topology: Box::new(FileTraceSink::create(&dir.join("topology.trace"))?),
			traffic: Box::new(FileTraceSink::create(&dir.join("traffic.trace"))?),
			lifecycle: Box::new(FileTraceSink::create(&dir.join("lifecycle.trace"))?),
			admission: Box::new(FileTraceSink::create(&dir.join("admission.trace"))?),
			qos: Box::new(FileTraceSink::create(&dir.join("qos.trace"))?),
		})
	}

	/// Lines recorded so far on `sink`, when it is a [`BufferTraceSink`]
	/// (as built by [`TraceSinks::buffered`]). Used by scenario tests to
	/// assert on trace content without touching the filesystem; returns
	/// `None` for a file-backed sink.
	fn buffered_lines(sink: &dyn TraceSink) -> Option<&[String]> {
		sink.as_any().downcast_ref::<BufferTraceSink>().map(|b| b.lines.as_slice())
	}

	pub fn topology_lines(&self) -> Option<&[String]> {
		Self::buffered_lines(self.topology.as_ref())
	}
	pub fn traffic_lines(&self) -> Option<&[String]> {
		Self::buffered_lines(self.traffic.as_ref())
	}
	pub fn lifecycle_lines(&self) -> Option<&[String]> {
		Self::buffered_lines(self.lifecycle.as_ref())
	}
	pub fn admission_lines(&self) -> Option<&[String]> {
		Self::buffered_lines(self.admission.as_ref())
	}
	pub fn qos_lines(&self) -> Option<&[String]> {
		Self::buffered_lines(self.qos.as_ref())
	}

	pub fn flush_all(&mut self) {
		self.topology.flush();
		self.traffic.flush();
		self.lifecycle.flush();
		self.admission.flush();
		self.qos.flush();
	}

	pub fn topology_line(&mut self, app_name: &str, start: Time, stop: Time, qci: u8, gbr: u64, mbr: u64, port: u32) {
		self.topology.write_line(format!(
			"{app_name} START_TIME {start} STOP_TIME {stop} QCI {qci} GBR {gbr} MBR {mbr} PORT {port}"
		));
	}

	pub fn traffic_line(&mut self, app_name: &str, now: Time, direction: &str, payload_bytes: u64, pid: u64) {
		let wire_bytes = payload_bytes + crate::packet::NETWORK_OVERHEAD;
		self.traffic.write_line(format!("{app_name} {now} {direction} {payload_bytes} {wire_bytes} {pid}"));
	}

	pub fn lifecycle_activation(&mut self, now: Time, imsi: u64, bid: u32, qci: u8, port: u32) {
		self.lifecycle.write_line(format!("{now} ACTIVATION IMSI {imsi} BID {bid} QCI {qci} TFT_PORT {port}"));
	}

	pub fn lifecycle_deactivation(&mut self, now: Time, imsi: u64, bid: u32, qci: u8, port: u32) {
		self.lifecycle.write_line(format!("{now} DEACTIVATION IMSI {imsi} BID {bid} QCI {qci} TFT_PORT {port}"));
	}

	pub fn lifecycle_modification(&mut self, now: Time, imsi: u64, bid: u32, old_qci: u8, new_qci: u8, port: u32) {
		self.lifecycle.write_line(format!(
			"{now} MODIFICATION IMSI {imsi} BID {bid} OLD_QCI {old_qci} NEW_QCI {new_qci} TFT_PORT {port}"
		));
	}

	pub fn admission_line(&mut self, now: Time, kind: &str, imsi: u64, rest: &str) {
		self.admission.write_line(format!("{now} {kind} IMSI {imsi} {rest}"));
	}

	#[allow(clippy::too_many_arguments)]
	pub fn qos_line(
		&mut self,
		now: Time,
		imsi: u64,
		bid: u32,
		throughput: (f64, f64, f64, f64),
		loss: (f64, f64, f64, f64),
		loss_pct: (f64, f64, f64, f64),
		delay: (f64, f64, f64, f64),
		max_error_rate: f64,
		max_delay_ms: u64,
	) {
		self.qos.write_line(format!(
			"{now} IMSI {imsi} BID {bid} \
			 THROUGHPUT MIN {:.2} AVG {:.2} MAX {:.2} LAST {:.2} \
			 LOSS MIN {:.2} AVG {:.2} MAX {:.2} LAST {:.2} \
			 LOSS_PCT MIN {:.6} AVG {:.6} MAX {:.6} LAST {:.6} TARGET {:.6} \
			 DELAY MIN {:.2} AVG {:.2} MAX {:.2} LAST {:.2} TARGET {:.2}",
			throughput.0,
			throughput.1,
			throughput.2,
			throughput.3,
			loss.0,
			loss.1,
			loss.2,
			loss.3,
			loss_pct.0,
			loss_pct.1,
			loss_pct.2,
			loss_pct.3,
			max_error_rate,
			delay.0,
			delay.1,
			delay.2,
			delay.3,
			max_delay_ms as f64,
		));
	}
}
