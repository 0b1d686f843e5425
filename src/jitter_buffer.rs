/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! The receiver's jitter buffer (spec.md §4.3).
//!
//! The reference implementation threads an intrusive singly-linked list
//! through each frame. spec.md §9 redesigns this into an owned ordered
//! container; this is a `Vec` kept sorted by timestamp via
//! binary-search insertion, bounded by `max_entries`.

use tracing::{debug, warn};

use crate::wire::{AudioFrame, WireTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    RejectedInPast,
    RejectedDuplicate,
    FlushedTooFarFuture,
}

pub struct JitterBuffer {
    entries: Vec<AudioFrame>,
    max_entries: usize,
    last_played: Option<WireTime>,
}

impl JitterBuffer {
    pub fn new(max_entries: usize) -> JitterBuffer {
        JitterBuffer {
            entries: Vec::with_capacity(max_entries.min(64)),
            max_entries,
            last_played: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_played_timestamp(&self) -> Option<WireTime> {
        self.last_played
    }

    /// Inserts `frame` in timestamp order, applying the late/duplicate/
    /// far-future policy of spec.md §4.3.
    pub fn insert(&mut self, frame: AudioFrame) -> InsertOutcome {
        if let Some(last) = self.last_played {
            if frame.timestamp <= last {
                debug!(ts = ?frame.timestamp, "dropping audio frame in the past");
                return InsertOutcome::RejectedInPast;
            }
        }

        let mut idx = 0;
        let mut steps = 0;
        while idx < self.entries.len() && self.entries[idx].timestamp < frame.timestamp {
            idx += 1;
            steps += 1;
            if steps >= self.max_entries {
                warn!(
                    max_entries = self.max_entries,
                    "jitter buffer flushed: frame too far in the future"
                );
                self.entries.clear();
                self.entries.push(frame);
                return InsertOutcome::FlushedTooFarFuture;
            }
        }

        if idx < self.entries.len() && self.entries[idx].timestamp == frame.timestamp {
            debug!(ts = ?frame.timestamp, "dropping duplicate audio frame");
            return InsertOutcome::RejectedDuplicate;
        }

        self.entries.insert(idx, frame);
        InsertOutcome::Inserted
    }

    /// Extracts the frame due at exactly `now`, dropping any stale
    /// entries ahead of it, per spec.md §4.3 `consume_at`.
    pub fn consume_at(&mut self, now: WireTime) -> Option<AudioFrame> {
        loop {
            let head_ts = self.entries.first()?.timestamp;
            if head_ts == now {
                let frame = self.entries.remove(0);
                self.last_played = Some(now);
                return Some(frame);
            } else if head_ts > now {
                return None;
            } else {
                self.entries.remove(0);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ts(ms: i64) -> WireTime {
        WireTime {
            tv_sec: ms / 1000,
            tv_nsec: ((ms % 1000) * 1_000_000) as u32,
        }
    }

    fn frame(ms: i64) -> AudioFrame {
        AudioFrame {
            timestamp: ts(ms),
            payload: vec![ms as u8],
        }
    }

    #[test]
    fn reorders_and_rejects_duplicate() {
        let mut jb = JitterBuffer::new(50);
        assert_eq!(jb.insert(frame(100)), InsertOutcome::Inserted);
        assert_eq!(jb.insert(frame(80)), InsertOutcome::Inserted);
        assert_eq!(jb.insert(frame(120)), InsertOutcome::Inserted);
        assert_eq!(jb.insert(frame(100)), InsertOutcome::RejectedDuplicate);
        assert_eq!(jb.len(), 3);

        let consumed = jb.consume_at(ts(100)).unwrap();
        assert_eq!(consumed.timestamp, ts(100));
        // 80ms is now in the past relative to last_played=100ms.
        assert_eq!(jb.consume_at(ts(80)), None);
    }

    #[test]
    fn flushes_when_far_future_insert_exhausts_budget() {
        let mut jb = JitterBuffer::new(50);
        for i in 0..50 {
            assert_eq!(jb.insert(frame(i * 20)), InsertOutcome::Inserted);
        }
        let outcome = jb.insert(frame(50 * 20));
        assert_eq!(outcome, InsertOutcome::FlushedTooFarFuture);
        assert_eq!(jb.len(), 1);
        assert_eq!(jb.entries[0].timestamp, ts(50 * 20));
    }

    #[test]
    fn consume_at_drops_stale_entries_ahead_of_target() {
        let mut jb = JitterBuffer::new(50);
        jb.insert(frame(80));
        jb.insert(frame(100));
        let consumed = jb.consume_at(ts(100)).unwrap();
        assert_eq!(consumed.payload, vec![100u8]);
        assert_eq!(jb.last_played_timestamp(), Some(ts(100)));
        assert!(jb.is_empty());
    }

    #[test]
    fn consume_at_returns_none_when_head_in_future() {
        let mut jb = JitterBuffer::new(50);
        jb.insert(frame(120));
        assert_eq!(jb.consume_at(ts(100)), None);
        assert_eq!(jb.len(), 1);
    }
}
