//! In-memory per-round mailbox.
//!
//! A round has two strictly separated phases. During the send phase every
//! agent writes into the shared [`Outbox`]; nothing is visible to anyone yet.
//! [`Mailbox::flush`] then drops whatever was still undelivered from the
//! previous round, moves the new envelopes into per-recipient inboxes and
//! reports the traffic. The receive phase drains those inboxes.
//!
//! The mailbox is generic over the payload type, so an agent kind only ever
//! sees the message kind it was written for.

use crate::ids::EntityId;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Debug;

/// Accounting bucket for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    /// Traffic the DCOP algorithm itself needs.
    Algorithm,
    /// Everything else (cross-team announcements).
    Other,
}

/// A message body that can be delivered through a [`Mailbox`].
pub trait Payload: Clone + Debug {
    /// Serialized size on the wire, in bytes.
    fn byte_size(&self) -> usize;

    fn category(&self) -> MessageCategory {
        MessageCategory::Algorithm
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub to: EntityId,
    pub payload: M,
}

/// Message volume of one or more rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficReport {
    pub algorithm_messages: u64,
    pub algorithm_bytes: u64,
    pub other_messages: u64,
    pub other_bytes: u64,
}

impl TrafficReport {
    pub fn record(&mut self, category: MessageCategory, bytes: usize) {
        match category {
            MessageCategory::Algorithm => {
                self.algorithm_messages += 1;
                self.algorithm_bytes += bytes as u64;
            }
            MessageCategory::Other => {
                self.other_messages += 1;
                self.other_bytes += bytes as u64;
            }
        }
    }

    pub fn merge(&mut self, other: &TrafficReport) {
        self.algorithm_messages += other.algorithm_messages;
        self.algorithm_bytes += other.algorithm_bytes;
        self.other_messages += other.other_messages;
        self.other_bytes += other.other_bytes;
    }

    pub fn total_messages(&self) -> u64 {
        self.algorithm_messages + self.other_messages
    }

    pub fn total_bytes(&self) -> u64 {
        self.algorithm_bytes + self.other_bytes
    }
}

/// Collects the envelopes written during a send phase.
#[derive(Debug)]
pub struct Outbox<M> {
    envelopes: Vec<Envelope<M>>,
}

impl<M> Default for Outbox<M> {
    fn default() -> Self {
        Self {
            envelopes: Vec::new(),
        }
    }
}

impl<M> Outbox<M> {
    pub fn send(&mut self, to: EntityId, payload: M) {
        self.envelopes.push(Envelope { to, payload });
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

/// Per-round mailbox keyed by recipient.
#[derive(Debug)]
pub struct Mailbox<M> {
    outbox: Outbox<M>,
    inboxes: HashMap<EntityId, Vec<M>>,
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        Self {
            outbox: Outbox::default(),
            inboxes: HashMap::new(),
        }
    }
}

impl<M: Payload> Mailbox<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write side for the current send phase.
    pub fn outbox(&mut self) -> &mut Outbox<M> {
        &mut self.outbox
    }

    /// Ends the send phase: discards last round's leftovers, delivers
    /// everything sent since the previous flush and reports its volume.
    pub fn flush(&mut self) -> TrafficReport {
        let mut report = TrafficReport::default();
        let dropped: usize = self.inboxes.values().map(Vec::len).sum();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarding messages nobody received last round");
        }
        self.inboxes.clear();

        for envelope in self.outbox.envelopes.drain(..) {
            report.record(envelope.payload.category(), envelope.payload.byte_size());
            self.inboxes
                .entry(envelope.to)
                .or_default()
                .push(envelope.payload);
        }
        report
    }

    /// Hands `recipient` everything delivered to it this round.
    pub fn take(&mut self, recipient: EntityId) -> Vec<M> {
        self.inboxes.remove(&recipient).unwrap_or_default()
    }

    /// Messages delivered but not yet taken.
    pub fn pending(&self) -> usize {
        self.inboxes.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u8, MessageCategory);

    impl Payload for Ping {
        fn byte_size(&self) -> usize {
            self.0 as usize
        }

        fn category(&self) -> MessageCategory {
            self.1
        }
    }

    #[test]
    fn test_nothing_is_visible_before_flush() {
        let mut mailbox = Mailbox::new();
        mailbox.outbox().send(EntityId(1), Ping(4, MessageCategory::Algorithm));
        assert!(mailbox.take(EntityId(1)).is_empty());
        mailbox.flush();
        assert_eq!(
            mailbox.take(EntityId(1)),
            vec![Ping(4, MessageCategory::Algorithm)]
        );
    }

    #[test]
    fn test_flush_reports_bytes_per_category() {
        let mut mailbox = Mailbox::new();
        mailbox.outbox().send(EntityId(1), Ping(8, MessageCategory::Algorithm));
        mailbox.outbox().send(EntityId(2), Ping(8, MessageCategory::Algorithm));
        mailbox.outbox().send(EntityId(2), Ping(5, MessageCategory::Other));
        let report = mailbox.flush();
        assert_eq!(report.algorithm_messages, 2);
        assert_eq!(report.algorithm_bytes, 16);
        assert_eq!(report.other_messages, 1);
        assert_eq!(report.other_bytes, 5);
        assert_eq!(report.total_bytes(), 21);
        assert_eq!(mailbox.pending(), 3);
    }

    #[test]
    fn test_messages_do_not_survive_a_round() {
        let mut mailbox = Mailbox::new();
        mailbox.outbox().send(EntityId(7), Ping(1, MessageCategory::Algorithm));
        mailbox.flush();
        // nobody took it
        let report = mailbox.flush();
        assert_eq!(report.total_messages(), 0);
        assert!(mailbox.take(EntityId(7)).is_empty());
    }

    #[test]
    fn test_merge_reports() {
        let mut total = TrafficReport::default();
        let mut round = TrafficReport::default();
        round.record(MessageCategory::Algorithm, 16);
        round.record(MessageCategory::Other, 8);
        total.merge(&round);
        total.merge(&round);
        assert_eq!(total.total_messages(), 4);
        assert_eq!(total.total_bytes(), 48);
    }
}
