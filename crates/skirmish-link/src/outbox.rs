//! Offline buffering and outbound rate limiting.
//!
//! The queue is a sliding window over recent intent, not a delivery
//! log: when full, the oldest entry is evicted to admit the newest. The
//! rate window is a hard drop -- over-cap messages are neither sent nor
//! queued.

use std::collections::VecDeque;
use std::time::Duration;

use skirmish_protocol::Message;
use tokio::time::Instant;

/// Ordered, size-bounded buffer for messages submitted while no
/// connection is open.
pub struct OutboundQueue {
    buf: VecDeque<Message>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entry when at capacity.
    /// Returns the evicted message, if any.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.buf.len() >= self.capacity {
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(message);
        evicted
    }

    /// Take every buffered message in original enqueue order.
    pub fn drain(&mut self) -> Vec<Message> {
        self.buf.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Rolling window of send timestamps capping the outbound message rate.
pub struct RateWindow {
    cap: usize,
    window: Duration,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(cap: usize, window: Duration) -> Self {
        Self {
            cap,
            window,
            stamps: VecDeque::new(),
        }
    }

    /// Record a send at `now` if the rolling window has room.
    pub fn admit(&mut self, now: Instant) -> bool {
        while let Some(front) = self.stamps.front() {
            if now.duration_since(*front) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }

        if self.stamps.len() >= self.cap {
            return false;
        }
        self.stamps.push_back(now);
        true
    }

    /// Sends currently inside the window.
    pub fn in_flight(&self) -> usize {
        self.stamps.len()
    }
}
