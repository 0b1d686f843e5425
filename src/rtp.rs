/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! Optional RTP framing for the sender (spec.md §4.5): standard 12-byte
//! header, payload type 96 (dynamic, mapped to opus), sequence number
//! and SSRC seeded from wall-clock time like the reference's
//! `srand(time(NULL))`.

use rtp_rs::RtpPacketBuilder;

use crate::error::SocketError;

const OPUS_PAYLOAD_TYPE: u8 = 96;

pub struct RtpState {
    sequence: u16,
    ssrc: u32,
    samples_per_period: u32,
    timestamp: u32,
}

impl RtpState {
    pub fn new(seed: u32, samples_per_period: u32) -> RtpState {
        RtpState {
            sequence: (seed & 0xffff) as u16,
            ssrc: seed,
            samples_per_period,
            timestamp: seed.wrapping_mul(2654435761),
        }
    }

    pub fn build(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, SocketError> {
        let packet = RtpPacketBuilder::new()
            .payload_type(OPUS_PAYLOAD_TYPE)
            .sequence(self.sequence.into())
            .timestamp(self.timestamp)
            .ssrc(self.ssrc)
            .payload(payload)
            .build_into(out)
            .map_err(|e| SocketError::Io(std::io::Error::other(format!("{e:?}"))))?;
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.samples_per_period);
        Ok(packet)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sequence_and_timestamp_advance_each_packet() {
        let mut rtp = RtpState::new(1234, 960);
        let mut buf = [0u8; 1500];
        let payload = [0xAAu8; 100];
        let n1 = rtp.build(&payload, &mut buf).unwrap();
        assert!(n1 >= 12 + payload.len());
        let first_seq = rtp.sequence;
        let first_ts = rtp.timestamp;
        rtp.build(&payload, &mut buf).unwrap();
        assert_eq!(rtp.sequence, first_seq.wrapping_add(1));
        assert_eq!(rtp.timestamp, first_ts.wrapping_add(960));
    }
}
