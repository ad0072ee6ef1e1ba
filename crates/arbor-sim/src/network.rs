use arbor_core::Event;
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Fault injection for the simulated push channel.
///
/// The channel never loses an event: delivery is at-least-once, so the
/// faults are delay, duplication and reordering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    /// Percentage of sends delivered twice.
    pub duplicate_rate_percent: u8,
    /// Percentage chance of shuffling the messages ready in one round.
    pub reorder_rate_percent: u8,
    /// Percentage of content lookups that fail.
    pub content_failure_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 3,
            duplicate_rate_percent: 5,
            reorder_rate_percent: 20,
            content_failure_percent: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight {
    deliver_at_round: u64,
    event: Event,
}

/// Result of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub duplicated: bool,
    pub delay_rounds: u8,
}

/// Messages delivered in one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome {
    pub delivered: Vec<Event>,
    pub reordered: bool,
}

/// One observer's push subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushChannel {
    in_flight: Vec<InFlight>,
    fault: FaultConfig,
}

impl PushChannel {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            in_flight: Vec::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Queue `event` for delivery at `round` plus a random delay.
    pub fn send(&mut self, event: &Event, round: u64, rng: &mut DeterministicRng) -> SendOutcome {
        let delay_bound = u64::from(self.fault.max_delay_rounds).saturating_add(1);
        let delay =
            u8::try_from(rng.next_bounded(delay_bound)).unwrap_or(self.fault.max_delay_rounds);
        self.in_flight.push(InFlight {
            deliver_at_round: round.saturating_add(u64::from(delay)),
            event: event.clone(),
        });

        let duplicated = rng.hit_rate_percent(self.fault.duplicate_rate_percent);
        if duplicated {
            // The copy may land on a different round than the original.
            let extra = rng.next_bounded(delay_bound);
            self.in_flight.push(InFlight {
                deliver_at_round: round.saturating_add(extra),
                event: event.clone(),
            });
        }
        SendOutcome {
            duplicated,
            delay_rounds: delay,
        }
    }

    /// Deliver every message due by `round`, possibly shuffled.
    pub fn deliver_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (mut ready, future): (Vec<InFlight>, Vec<InFlight>) = self
            .in_flight
            .drain(..)
            .partition(|m| m.deliver_at_round <= round);
        self.in_flight = future;

        let reordered = ready.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent);
        if reordered {
            rng.shuffle(&mut ready);
        }
        DeliverOutcome {
            delivered: ready.into_iter().map(|m| m.event).collect(),
            reordered,
        }
    }

    /// Deliver everything still in flight.
    pub fn drain(&mut self, rng: &mut DeterministicRng) -> DeliverOutcome {
        self.deliver_ready(u64::MAX, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::event::{EventData, TreeCreatedData};
    use arbor_core::{Address, EventPosition};

    fn event(block: u64) -> Event {
        Event::new(
            EventPosition::new(block, 0),
            0,
            Address::new("0xa"),
            EventData::TreeCreated(TreeCreatedData::default()),
        )
    }

    #[test]
    fn nothing_is_lost() {
        let fault = FaultConfig {
            max_delay_rounds: 4,
            duplicate_rate_percent: 50,
            reorder_rate_percent: 50,
            content_failure_percent: 0,
        };
        let mut rng = DeterministicRng::new(1);
        let mut channel = PushChannel::new(fault);
        let mut sent = 0;
        for block in 0..40 {
            let outcome = channel.send(&event(block), block, &mut rng);
            sent += 1 + usize::from(outcome.duplicated);
        }

        let mut delivered = Vec::new();
        for round in 0..20 {
            delivered.extend(channel.deliver_ready(round, &mut rng).delivered);
        }
        delivered.extend(channel.drain(&mut rng).delivered);
        assert_eq!(delivered.len(), sent);
        assert_eq!(channel.in_flight(), 0);
        for block in 0..40 {
            assert!(delivered.iter().any(|e| e.block_number == block));
        }
    }

    #[test]
    fn zero_delay_delivers_same_round() {
        let fault = FaultConfig {
            max_delay_rounds: 0,
            duplicate_rate_percent: 0,
            reorder_rate_percent: 0,
            content_failure_percent: 0,
        };
        let mut rng = DeterministicRng::new(2);
        let mut channel = PushChannel::new(fault);
        let _ = channel.send(&event(1), 5, &mut rng);
        let outcome = channel.deliver_ready(5, &mut rng);
        assert_eq!(outcome.delivered.len(), 1);
        assert!(!outcome.reordered);
    }
}
