/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! Wire framing for AudioFrame/TimeRequest/TimeReply, big-endian and
//! packed with no padding, matching `mtrx.h`'s `azzp`/`timep`/`timep2`.

/// A `(seconds, nanoseconds)` wall-clock instant as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WireTime {
    pub tv_sec: i64,
    pub tv_nsec: u32,
}

impl WireTime {
    pub const ZERO: WireTime = WireTime {
        tv_sec: 0,
        tv_nsec: 0,
    };

    /// Adds a signed nanosecond delta, normalising in one step (spec.md
    /// §4.2/§9: the later, single-normalisation `timeadd` form).
    pub fn add_nanos(self, delta_ns: i64) -> WireTime {
        let combined = self.tv_nsec as i64 + delta_ns;
        let mut sec = self.tv_sec + combined.div_euclid(1_000_000_000);
        let mut nsec = combined.rem_euclid(1_000_000_000);
        if nsec == 1_000_000_000 {
            sec += 1;
            nsec = 0;
        }
        WireTime {
            tv_sec: sec,
            tv_nsec: nsec as u32,
        }
    }

    pub fn as_nanos_i128(self) -> i128 {
        self.tv_sec as i128 * 1_000_000_000 + self.tv_nsec as i128
    }

    fn to_be_bytes(self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0..8].copy_from_slice(&self.tv_sec.to_be_bytes());
        out[8..12].copy_from_slice(&self.tv_nsec.to_be_bytes());
        out
    }

    fn from_be_bytes(b: &[u8]) -> WireTime {
        let mut sec = [0u8; 8];
        sec.copy_from_slice(&b[0..8]);
        let mut nsec = [0u8; 4];
        nsec.copy_from_slice(&b[8..12]);
        WireTime {
            tv_sec: i64::from_be_bytes(sec),
            tv_nsec: u32::from_be_bytes(nsec),
        }
    }
}

/// An audio datagram: a grid-aligned sender timestamp plus an opaque
/// (Opus-encoded) payload. On the wire the payload length is implicit in
/// the UDP datagram length, never transmitted explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub timestamp: WireTime,
    pub payload: Vec<u8>,
}

impl AudioFrame {
    pub const HEADER_LEN: usize = 12;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parses any datagram longer than the header as an AudioFrame; the
    /// caller is responsible for having already ruled out TimeRequest
    /// (12 bytes) and TimeReply (24 bytes) by length.
    pub fn decode(buf: &[u8]) -> Option<AudioFrame> {
        if buf.len() <= Self::HEADER_LEN {
            return None;
        }
        Some(AudioFrame {
            timestamp: WireTime::from_be_bytes(&buf[0..12]),
            payload: buf[12..].to_vec(),
        })
    }
}

/// A receiver-initiated time-sync request, exactly 12 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRequest {
    pub t1: WireTime,
}

impl TimeRequest {
    pub const LEN: usize = 12;

    pub fn encode(&self) -> [u8; Self::LEN] {
        self.t1.to_be_bytes()
    }

    pub fn decode(buf: &[u8]) -> Option<TimeRequest> {
        if buf.len() != Self::LEN {
            return None;
        }
        Some(TimeRequest {
            t1: WireTime::from_be_bytes(&buf[0..12]),
        })
    }
}

/// A sender's reply to a [`TimeRequest`], exactly 24 bytes: the echoed
/// request timestamp followed by the sender's wall clock at reply time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeReply {
    pub t1: WireTime,
    pub t2: WireTime,
}

impl TimeReply {
    pub const LEN: usize = 24;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..12].copy_from_slice(&self.t1.to_be_bytes());
        out[12..24].copy_from_slice(&self.t2.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Option<TimeReply> {
        if buf.len() != Self::LEN {
            return None;
        }
        Some(TimeReply {
            t1: WireTime::from_be_bytes(&buf[0..12]),
            t2: WireTime::from_be_bytes(&buf[12..24]),
        })
    }
}

/// What kind of packet a datagram of a given length must be, per spec.md
/// §4.1/§6: disambiguation is by exact length alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    TimeRequest,
    TimeReply,
    Audio,
}

pub fn classify(len: usize) -> PacketKind {
    match len {
        TimeRequest::LEN => PacketKind::TimeRequest,
        TimeReply::LEN => PacketKind::TimeReply,
        _ => PacketKind::Audio,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn audio_frame_round_trips() {
        let frame = AudioFrame {
            timestamp: WireTime {
                tv_sec: 1_700_000_000,
                tv_nsec: 20_000_000,
            },
            payload: vec![1, 2, 3, 4, 5],
        };
        let encoded = frame.encode();
        assert_eq!(encoded.len(), AudioFrame::HEADER_LEN + 5);
        assert_eq!(AudioFrame::decode(&encoded), Some(frame));
    }

    #[test]
    fn time_request_round_trips() {
        let req = TimeRequest {
            t1: WireTime {
                tv_sec: 100,
                tv_nsec: 0,
            },
        };
        let encoded = req.encode();
        assert_eq!(encoded.len(), TimeRequest::LEN);
        assert_eq!(TimeRequest::decode(&encoded), Some(req));
    }

    #[test]
    fn time_reply_round_trips() {
        let reply = TimeReply {
            t1: WireTime {
                tv_sec: 100,
                tv_nsec: 0,
            },
            t2: WireTime {
                tv_sec: 105,
                tv_nsec: 500_000_000,
            },
        };
        let encoded = reply.encode();
        assert_eq!(encoded.len(), TimeReply::LEN);
        assert_eq!(TimeReply::decode(&encoded), Some(reply));
    }

    #[test]
    fn classify_dispatches_by_exact_length() {
        assert_eq!(classify(12), PacketKind::TimeRequest);
        assert_eq!(classify(24), PacketKind::TimeReply);
        assert_eq!(classify(512), PacketKind::Audio);
        assert_eq!(classify(13), PacketKind::Audio);
    }

    #[test]
    fn add_nanos_normalises_negative_deltas() {
        let t = WireTime {
            tv_sec: 10,
            tv_nsec: 5,
        };
        let adjusted = t.add_nanos(-1_000_000_010);
        assert_eq!(adjusted.tv_sec, 8);
        assert_eq!(adjusted.tv_nsec, 999_999_995);
    }
}
