use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use common::models::{BalanceSummary, Signal, TradeLogEntry};
use strategy::TradeMarker;

/// FIFO that evicts its oldest entry once `capacity` is reached.
#[derive(Debug, Clone, Serialize)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

pub type TradeLog = BoundedBuffer<TradeLogEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Idle,
    PollingPrice,
    PollingSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Everything the presentation layer reads from the live loop.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub state: LoopState,
    pub prices: BoundedBuffer<PricePoint>,
    pub trade_log: TradeLog,
    pub markers: BoundedBuffer<TradeMarker>,
    pub balance: Option<BalanceSummary>,
    pub last_signal: Option<Signal>,
}

impl LiveSnapshot {
    pub fn new(price_history: usize, trade_log_capacity: usize) -> Self {
        Self {
            state: LoopState::Idle,
            prices: BoundedBuffer::new(price_history),
            trade_log: BoundedBuffer::new(trade_log_capacity),
            markers: BoundedBuffer::new(price_history),
            balance: None,
            last_signal: None,
        }
    }
}

pub type SharedSnapshot = Arc<RwLock<LiveSnapshot>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_evicts_oldest_first() {
        let mut buffer = BoundedBuffer::new(3);
        for i in 0..5 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(buffer.latest(), Some(&4));
    }

    #[test]
    fn zero_capacity_still_keeps_the_latest() {
        let mut buffer = BoundedBuffer::new(0);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn new_snapshot_is_idle_and_empty() {
        let snapshot = LiveSnapshot::new(1_000, 50);
        assert_eq!(snapshot.state, LoopState::Idle);
        assert!(snapshot.trade_log.is_empty());
        assert!(snapshot.balance.is_none());
    }
}
