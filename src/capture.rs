/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! The sender's capture scheduler (spec.md §4.5): reads PCM from the
//! device, encodes it, paces sends to the clock grid, and
//! periodically resynchronises with the device to shed accumulated
//! latency.

use std::net::UdpSocket;

use tracing::{debug, warn};

use crate::clock_grid::ClockGrid;
use crate::codec::Encoder;
use crate::config::SenderConfig;
use crate::device::PcmDevice;
use crate::error::MtrxError;
use crate::playback::{current_time, sleep_until_absolute};
use crate::wire::{AudioFrame, WireTime};

/// True when a resync beacon should fire: a 5-second wall-clock
/// boundary, or the device has drifted more than one period ahead of
/// the grid (spec.md §4.5 step 5).
pub fn needs_resync(now: WireTime, elapsed_since_last_tick_ns: i64, period_ns: i64) -> bool {
    (now.tv_sec % 5 == 0 && now.tv_nsec == 0) || elapsed_since_last_tick_ns > period_ns
}

/// Drains accumulated device latency in bounded chunks until the
/// device's reported delay is at or below one period, matching
/// `mtx.c`'s resync drain loop.
pub fn resync_drain(
    device: &mut dyn PcmDevice,
    samples_per_period: usize,
    bytes_per_frame: usize,
) -> Result<(), MtrxError> {
    loop {
        let status = device.status()?;
        if status.delay_frames <= samples_per_period as i64 {
            return Ok(());
        }
        let chunk_frames = (status.avail_frames.max(samples_per_period as i64))
            .min(status.delay_frames)
            .min(100_000) as usize;
        if chunk_frames == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; chunk_frames * bytes_per_frame];
        let read = device.read_samples(&mut buf)?;
        if read < buf.len() {
            debug!("resync drain short read, stopping early");
            return Ok(());
        }
    }
}

/// Runs the capture loop until the process is killed. Graceful
/// shutdown is out of scope (spec.md §5).
pub fn run(
    config: &SenderConfig,
    socket: &UdpSocket,
    target: std::net::SocketAddrV4,
    mut device: Box<dyn PcmDevice>,
    mut encoder: Box<dyn Encoder>,
    mut rtp: Option<crate::rtp::RtpState>,
) -> Result<(), MtrxError> {
    crate::privilege::set_realtime_priority();

    let grid = ClockGrid::new(config.common.period_ns(), 0);
    let samples_per_period = config.common.samples_per_period();
    let bytes_per_frame = config.common.bytes_per_frame();
    let opus_buf_len = config.bytes_per_opus_frame();

    let mut resync = true;
    let mut last_tick: Option<WireTime> = None;

    loop {
        if resync {
            resync_drain(device.as_mut(), samples_per_period, bytes_per_frame)?;
            resync = false;
        }

        let mut pcm_bytes = vec![0u8; samples_per_period * bytes_per_frame];
        device.read_samples(&mut pcm_bytes)?;

        let pcm: Vec<i16> = pcm_bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let mut opus_out = vec![0u8; opus_buf_len];
        let written = encoder.encode(&pcm, &mut opus_out)?;
        opus_out.truncate(written);

        let now = current_time();
        let tick = grid.quantise_down(now);
        let tick = match last_tick {
            Some(last) if tick <= last => last.add_nanos(config.common.period_ns()),
            _ => tick,
        };
        sleep_until_absolute(tick);

        if let Some(last) = last_tick {
            let elapsed = tick.as_nanos_i128() - last.as_nanos_i128();
            if needs_resync(tick, elapsed as i64, config.common.period_ns()) {
                resync = true;
            }
        }
        last_tick = Some(tick);

        send_packet(socket, target, tick, &opus_out, rtp.as_mut())?;
    }
}

fn send_packet(
    socket: &UdpSocket,
    target: std::net::SocketAddrV4,
    tick: WireTime,
    payload: &[u8],
    rtp: Option<&mut crate::rtp::RtpState>,
) -> Result<(), MtrxError> {
    let mut buf = [0u8; 1500];
    let len = match rtp {
        Some(rtp_state) => rtp_state
            .build(payload, &mut buf)
            .map_err(MtrxError::Socket)?,
        None => {
            let frame = AudioFrame {
                timestamp: tick,
                payload: payload.to_vec(),
            };
            let encoded = frame.encode();
            if encoded.len() > buf.len() {
                warn!(len = encoded.len(), "frame exceeds MTU, dropping");
                return Ok(());
            }
            buf[..encoded.len()].copy_from_slice(&encoded);
            encoded.len()
        }
    };
    if len > 1500 {
        warn!(len, "packet exceeds MTU, dropping");
        return Ok(());
    }
    socket
        .send_to(&buf[..len], target)
        .map_err(|e| MtrxError::Socket(crate::error::SocketError::Io(e)))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn ts(sec: i64, nsec: u32) -> WireTime {
        WireTime {
            tv_sec: sec,
            tv_nsec: nsec,
        }
    }

    #[test]
    fn needs_resync_on_five_second_boundary() {
        assert!(needs_resync(ts(5, 0), 0, 20_000_000));
        assert!(!needs_resync(ts(6, 0), 0, 20_000_000));
    }

    #[test]
    fn needs_resync_when_elapsed_exceeds_period() {
        assert!(needs_resync(ts(1, 0), 21_000_000, 20_000_000));
        assert!(!needs_resync(ts(1, 0), 19_000_000, 20_000_000));
    }
}
