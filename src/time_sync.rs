/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! The time-sync protocol (spec.md §4.6): a receiver-initiated
//! request/reply round trip used to estimate `sender_clock -
//! receiver_clock`. The offset is published through an atomic cell with
//! a single writer (the network thread) and a single reader (the
//! playback thread), replacing the reference's second mutex per
//! spec.md §9.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::wire::{TimeReply, TimeRequest, WireTime};

/// Single-writer/single-reader shared clock offset, in nanoseconds.
pub struct SharedOffset(AtomicI64);

impl SharedOffset {
    pub fn new() -> SharedOffset {
        SharedOffset(AtomicI64::new(0))
    }

    pub fn load(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn store(&self, value_ns: i64) {
        self.0.store(value_ns, Ordering::Release);
    }
}

impl Default for SharedOffset {
    fn default() -> Self {
        Self::new()
    }
}

/// Sender-side: builds the reply to a request, echoing `t1` and
/// stamping `t2` with the sender's current wall clock.
pub fn build_reply(request: TimeRequest, now: WireTime) -> TimeReply {
    TimeReply {
        t1: request.t1,
        t2: now,
    }
}

/// Receiver-side: decides whether a new TimeRequest should be sent this
/// tick. At most one request is sent per wall-clock second (spec.md
/// §4.6).
pub fn should_send_request(time_sync_enabled: bool, last_sent: Option<WireTime>, now: WireTime) -> bool {
    time_sync_enabled && last_sent.map(|t| t.tv_sec != now.tv_sec).unwrap_or(true)
}

/// Receiver-side: validates a reply against the request it claims to
/// answer, and if valid, estimates `sender_clock - receiver_clock` in
/// nanoseconds.
///
/// The midpoint of `(last_time_sent, t_recv)` is computed separately on
/// seconds and nanoseconds before being combined with `t2`, exactly
/// matching the reference implementation's arithmetic so that existing
/// peers remain bit-compatible (spec.md §4.6, §9).
pub fn estimate_offset(reply: TimeReply, last_time_sent: WireTime, t_recv: WireTime) -> Option<i64> {
    if reply.t1 != last_time_sent {
        return None;
    }
    let mid_sec = (last_time_sent.tv_sec + t_recv.tv_sec) / 2;
    let mid_nsec = (last_time_sent.tv_nsec as i64 + t_recv.tv_nsec as i64) / 2;
    let offset_ns =
        (reply.t2.tv_sec - mid_sec) * 1_000_000_000 + (reply.t2.tv_nsec as i64 - mid_nsec);
    Some(offset_ns)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn estimate_offset_matches_scenario_4() {
        let last_time_sent = WireTime {
            tv_sec: 100,
            tv_nsec: 0,
        };
        let t_recv = WireTime {
            tv_sec: 100,
            tv_nsec: 200_000_000,
        };
        let reply = TimeReply {
            t1: last_time_sent,
            t2: WireTime {
                tv_sec: 105,
                tv_nsec: 500_000_000,
            },
        };
        let offset = estimate_offset(reply, last_time_sent, t_recv).unwrap();
        assert_eq!(offset, 5_400_000_000);
    }

    #[test]
    fn estimate_offset_rejects_mismatched_echo() {
        let last_time_sent = WireTime {
            tv_sec: 100,
            tv_nsec: 0,
        };
        let wrong_echo = WireTime {
            tv_sec: 99,
            tv_nsec: 0,
        };
        let reply = TimeReply {
            t1: wrong_echo,
            t2: WireTime {
                tv_sec: 105,
                tv_nsec: 0,
            },
        };
        assert_eq!(
            estimate_offset(reply, last_time_sent, last_time_sent),
            None
        );
    }

    #[test]
    fn should_send_request_once_per_wall_second() {
        let now = WireTime {
            tv_sec: 10,
            tv_nsec: 500_000_000,
        };
        assert!(should_send_request(true, None, now));
        assert!(!should_send_request(
            true,
            Some(WireTime {
                tv_sec: 10,
                tv_nsec: 0
            }),
            now
        ));
        assert!(should_send_request(
            true,
            Some(WireTime {
                tv_sec: 9,
                tv_nsec: 0
            }),
            now
        ));
        assert!(!should_send_request(false, None, now));
    }
}
