//! Outbound packet pacing
//!
//! Battle.net disconnects clients that flood it, so chat commands and other
//! user-driven packets go through a FIFO that releases at most one packet per
//! wait period. The wait grows with the size of the previous packet and with
//! a frequency penalty that accumulates while the queue stays busy.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// More packets than this waiting triggers a warning on every send
pub const QUEUE_WARNING_THRESHOLD: usize = 7;

/// New packets are discarded while more than this many are waiting
pub const QUEUE_DROP_THRESHOLD: usize = 10;

/// Extra delay per frequency penalty point
const PENALTY_STEP: Duration = Duration::from_millis(60);

/// Penalty resets once it reaches this value
const PENALTY_CAP: u32 = 100;

/// An idle gap this much longer than the wait resets the penalty
const IDLE_GRACE: Duration = Duration::from_millis(500);

/// Base delay after sending a packet of `size` bytes
pub fn step_delay(size: usize) -> Duration {
    let ms = match size {
        0..=9 => 1300,
        10..=29 => 3400,
        30..=49 => 3600,
        50..=99 => 3900,
        _ => 5500,
    };
    Duration::from_millis(ms)
}

#[derive(Debug)]
pub struct PacingQueue {
    packets: VecDeque<Vec<u8>>,
    last_out_at: Instant,
    last_out_size: usize,
    frequency_penalty: u32,
}

impl PacingQueue {
    pub fn new(now: Instant) -> Self {
        Self {
            packets: VecDeque::new(),
            last_out_at: now,
            last_out_size: 0,
            frequency_penalty: 0,
        }
    }

    /// Forget queued packets and pacing history, as on a fresh connection
    pub fn reset(&mut self, now: Instant) {
        self.packets.clear();
        self.last_out_at = now;
        self.last_out_size = 0;
        self.frequency_penalty = 0;
    }

    /// Drop queued packets but keep the pacing history
    pub fn clear(&mut self) {
        self.packets.clear();
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    #[cfg(test)]
    fn frequency_penalty(&self) -> u32 {
        self.frequency_penalty
    }

    /// Current wait between the previous send and the next one
    pub fn wait(&self) -> Duration {
        step_delay(self.last_out_size) + PENALTY_STEP * self.frequency_penalty
    }

    /// Enqueue a packet unless the queue is saturated
    ///
    /// Returns `false` when the packet was discarded.
    pub fn try_push(&mut self, packet: Vec<u8>, what: &str) -> bool {
        if self.packets.len() > QUEUE_DROP_THRESHOLD {
            warn!(
                "Attempted to queue {} but there are too many ({}) packets queued, discarding",
                what,
                self.packets.len()
            );
            return false;
        }

        self.packets.push_back(packet);
        true
    }

    /// Release the head of the queue if its wait has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.is_empty() {
            return None;
        }

        let wait = self.wait();
        if now.saturating_duration_since(self.last_out_at) < wait {
            return None;
        }

        if self.packets.len() > QUEUE_WARNING_THRESHOLD {
            info!(
                "Packet queue warning - there are {} packets waiting to be sent",
                self.packets.len()
            );
        }

        let packet = self.packets.pop_front()?;
        self.last_out_size = packet.len();

        if self.frequency_penalty >= PENALTY_CAP || now > self.last_out_at + wait + IDLE_GRACE {
            self.frequency_penalty = 0;
        } else {
            self.frequency_penalty += 1;
        }

        self.last_out_at = now;
        Some(packet)
    }
}
