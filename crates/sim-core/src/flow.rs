// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::collections::{BTreeMap, VecDeque};

use crate::ids::{AppId, TerminalId};
use crate::packet::Packet;
use crate::time::Time;

/// Identifier of the always-on flow every terminal owns; it can never be
/// torn down.
pub const DEFAULT_FLOW_BID: u32 = 1;

/// What to schedule after a packet finishes transmitting: a delivery event
/// on the generating application, `TX_DELAY` later.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryInfo {
	pub app: AppId,
	pub pid: u64,
	pub wire_bytes: u64,
}

/// Per-second aggregation of a flow's throughput, loss and in-queue packet
/// age, trimmed and gap-filled over `[now - window, now]` (spec §4.3
/// `metrics`).
#[derive(Debug, Clone, Default)]
pub struct FlowMetricsWindow {
	pub throughput: BTreeMap<u64, u64>,
	pub loss: BTreeMap<u64, u64>,
	pub age_ms: BTreeMap<u64, u64>,
}

/// A per-QoS byte queue ("bearer" in the source terminology).
pub struct Flow {
	pub terminal: TerminalId,
	pub bid: u32,
	pub qci: u8,
	pub gbr: u64,
	pub mbr: u64,
	pub pvi: bool,
	pub pci: bool,
	pub arp: u32,
	pub capacity: u64,
	pub mcs: u8,
	pub port: Option<u32>,
	pub queue: VecDeque<Packet>,
	throughput: BTreeMap<u64, u64>,
	loss: BTreeMap<u64, u64>,
	pub alive: bool,
}

impl Flow {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		terminal: TerminalId,
		bid: u32,
		qci: u8,
		gbr: u64,
		mbr: u64,
		pvi: bool,
		pci: bool,
		arp: u32,
		capacity: u64,
		mcs: u8,
		port: Option<u32>,
	) -> Self {
		Flow {
			terminal,
			bid,
			qci,
			gbr,
			mbr,
			pvi,
			pci,
			arp,
			capacity,
			mcs,
			port,
			queue: VecDeque::new(),
			throughput: BTreeMap::new(),
			loss: BTreeMap::new(),
			alive: true,
		}
	}

	pub fn is_default(&self) -> bool {
		self.bid == DEFAULT_FLOW_BID
	}

	/// Bytes still occupying the RLC buffer across all queued packets.
	pub fn queue_used(&self) -> u64 {
		self.queue.iter().map(|p| p.queue_footprint()).sum()
	}

	pub fn pending_size(&self) -> u64 {
		self.queue.iter().map(|p| p.pending()).sum()
	}

	/// Appends `packet` if capacity allows, else records its full
	/// pre-retry size as loss for the current second and drops it.
	/// Returns whether the packet was enqueued.
	pub fn enqueue(&mut self, packet: Packet, now: Time) -> bool {
		if self.queue_used() + packet.size <= self.capacity {
			self.queue.push_back(packet);
			true
		} else {
			*self.loss.entry(now.floor_to_secs()).or_insert(0) += packet.size;
			false
		}
	}

	/// Consumes up to `bytes` of pending from the head packet(s). When
	/// `retry` is false, moves bytes into `tx_sent`, credits throughput
	/// with the amount actually drained from the queue (never more than
	/// `pending_size()` had to offer, e.g. when the AMC's `tbs` overshoots
	/// pending bytes), and removes+returns delivery info for any packet
	/// that becomes fully sent. When `retry` is true, moves bytes into
	/// `tx_retry` instead (no throughput credit, no removal).
	pub fn transmit(&mut self, mut bytes: u64, retry: bool, now: Time) -> Vec<DeliveryInfo> {
		let mut delivered = Vec::new();
		let mut credited = 0;
		let mut i = 0;
		while bytes > 0 && i < self.queue.len() {
			let packet = &mut self.queue[i];
			let take = packet.pending().min(bytes);
			if take == 0 {
				i += 1;
				continue;
			}
			if retry {
				packet.tx_retry += take;
			} else {
				packet.tx_sent += take;
				credited += take;
			}
			bytes -= take;

			if !retry && packet.is_fully_sent() {
				delivered.push(DeliveryInfo { app: packet.app, pid: packet.id, wire_bytes: packet.size });
				self.queue.remove(i);
				// Do not advance `i`: the next packet shifted into this slot.
			} else {
				i += 1;
			}
		}
		if !retry && credited > 0 {
			*self.throughput.entry(now.floor_to_secs()).or_insert(0) += credited;
		}
		delivered
	}

	/// Moves up to `bytes` from `tx_retry` back to `tx_sent` across the
	/// head packet(s), crediting the whole requested amount to
	/// throughput regardless of how much was actually available.
	pub fn retransmit(&mut self, mut bytes: u64, now: Time) -> Vec<DeliveryInfo> {
		let mut delivered = Vec::new();
		let credited = bytes;
		let mut i = 0;
		while bytes > 0 && i < self.queue.len() {
			let packet = &mut self.queue[i];
			let take = packet.tx_retry.min(bytes);
			if take == 0 {
				i += 1;
				continue;
			}
			packet.tx_retry -= take;
			packet.tx_sent += take;
			bytes -= take;

			if packet.is_fully_sent() {
				delivered.push(DeliveryInfo { app: packet.app, pid: packet.id, wire_bytes: packet.size });
				self.queue.remove(i);
			} else {
				i += 1;
			}
		}
		if credited > 0 {
			*self.throughput.entry(now.floor_to_secs()).or_insert(0) += credited;
		}
		delivered
	}

	pub fn modify_qos(&mut self, qci: u8, gbr: u64, mbr: u64) {
		self.qci = qci;
		self.gbr = gbr;
		self.mbr = mbr;
	}

	/// Returns the gap-filled, windowed metrics and trims stored
	/// throughput/loss history older than `now - window`.
	pub fn metrics(&mut self, now: Time, window: u64) -> FlowMetricsWindow {
		let now_s = now.floor_to_secs();
		let cutoff = now_s.saturating_sub(window);

		self.throughput.retain(|&sec, _| sec >= cutoff);
		self.loss.retain(|&sec, _| sec >= cutoff);

		let mut age_ms: BTreeMap<u64, u64> = BTreeMap::new();
		for packet in &self.queue {
			let created_s = packet.created.floor_to_secs();
			if created_s < cutoff {
				continue;
			}
			let age = now - packet.created;
			let entry = age_ms.entry(created_s).or_insert(0);
			*entry = (*entry).max(age);
		}

		let mut window_out = FlowMetricsWindow::default();
		for sec in cutoff..=now_s {
			window_out.throughput.insert(sec, *self.throughput.get(&sec).unwrap_or(&0));
			window_out.loss.insert(sec, *self.loss.get(&sec).unwrap_or(&0));
			window_out.age_ms.insert(sec, *age_ms.get(&sec).unwrap_or(&0));
		}
		window_out
	}

	/// Last-second slice used by the QoS monitor: `throughput_sum`,
	/// `loss_sum`, `loss_pct`, `max_delay_ms`.
	pub fn last_second_summary(&mut self, now: Time) -> (u64, u64, f64, u64) {
		let window = self.metrics(now, 1);
		let throughput_sum: u64 = window.throughput.values().sum();
		let loss_sum: u64 = window.loss.values().sum();
		let loss_pct = if throughput_sum + loss_sum == 0 {
			0.0
		} else {
			loss_sum as f64 / (loss_sum + throughput_sum) as f64
		};
		let max_delay = window.age_ms.values().copied().max().unwrap_or(0);
		(throughput_sum, loss_sum, loss_pct, max_delay)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn flow() -> Flow {
		Flow::new(TerminalId(0), 1, 9, 0, 0, false, false, 15, 10_000, 8, None)
	}

	#[test]
	fn enqueue_rejects_over_capacity_and_records_loss() {
		let mut f = Flow::new(TerminalId(0), 1, 9, 0, 0, false, false, 15, 100, 8, None);
		assert!(f.enqueue(Packet::new(1, 60, Time::ZERO, AppId(0)), Time::ZERO));
		assert!(!f.enqueue(Packet::new(2, 60, Time::ZERO, AppId(0)), Time::ZERO));
		let window = f.metrics(Time::ZERO, 1);
		assert_eq!(*window.loss.get(&0).unwrap(), 60);
	}

	#[test]
	fn transmit_moves_bytes_and_schedules_delivery_on_completion() {
		let mut f = flow();
		f.enqueue(Packet::new(1, 100, Time::ZERO, AppId(7)), Time::ZERO);
		let delivered = f.transmit(100, false, Time::from_millis(10));
		assert_eq!(delivered.len(), 1);
		assert_eq!(delivered[0].app, AppId(7));
		assert!(f.queue.is_empty());
	}

	#[test]
	fn transmit_retry_does_not_remove_or_credit_throughput() {
		let mut f = flow();
		f.enqueue(Packet::new(1, 100, Time::ZERO, AppId(0)), Time::ZERO);
		let delivered = f.transmit(100, true, Time::ZERO);
		assert!(delivered.is_empty());
		assert_eq!(f.queue.front().unwrap().tx_retry, 100);
		let window = f.metrics(Time::ZERO, 1);
		assert_eq!(*window.throughput.get(&0).unwrap(), 0);
	}

	#[test]
	fn transmit_credits_only_bytes_actually_drained_from_the_queue() {
		let mut f = flow();
		f.enqueue(Packet::new(1, 40, Time::ZERO, AppId(0)), Time::ZERO);
		// tbs overshoots the packet's pending bytes, as happens whenever
		// `pending_size()` isn't an exact multiple of the AMC's per-RB size.
		let delivered = f.transmit(64, false, Time::ZERO);
		assert_eq!(delivered.len(), 1);
		let window = f.metrics(Time::ZERO, 1);
		assert_eq!(*window.throughput.get(&0).unwrap(), 40);
	}

	#[test]
	fn retransmit_credits_full_requested_amount() {
		let mut f = flow();
		f.enqueue(Packet::new(1, 100, Time::ZERO, AppId(0)), Time::ZERO);
		f.transmit(100, true, Time::ZERO);
		let delivered = f.retransmit(100, Time::from_millis(500));
		assert_eq!(delivered.len(), 1);
		let window = f.metrics(Time::from_millis(500), 1);
		assert_eq!(*window.throughput.get(&0).unwrap(), 100);
	}

	#[test]
	fn metrics_gap_fills_missing_seconds() {
		let mut f = flow();
		f.enqueue(Packet::new(1, 10, Time::ZERO, AppId(0)), Time::ZERO);
		f.transmit(10, false, Time::ZERO);
		let window = f.metrics(Time::from_millis(3000), 3);
		assert_eq!(window.throughput.len(), 4);
		assert_eq!(*window.throughput.get(&0).unwrap(), 10);
		assert_eq!(*window.throughput.get(&2).unwrap(), 0);
	}
}
