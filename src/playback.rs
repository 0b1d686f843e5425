/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! The receiver's playback scheduler (spec.md §4.4): a fixed-period
//! realtime loop that sleeps to the clock grid, pulls the due frame
//! from the jitter buffer (or conceals its absence), and writes PCM to
//! the device.

use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use crate::clock_grid::ClockGrid;
use crate::codec::Decoder;
use crate::config::ReceiverConfig;
use crate::device::{DeviceStatus, PcmDevice};
use crate::error::{DeviceError, MtrxError};
use crate::jitter_buffer::JitterBuffer;
use crate::time_sync::SharedOffset;
use crate::wire::WireTime;

/// `delay2` in spec.md §4.2: the nanosecond correction so that the
/// nominal grid tick lands `delay_ms` before the frame must reach the
/// device, adjusted for the device's own buffered latency.
pub fn device_correction_ns(delay_ms: u32, device_buffer_frames: u32, rate: u32) -> i64 {
    -(delay_ms as i64) * 1_000_000 + (device_buffer_frames as i64) * 1_000_000_000 / rate as i64
}

/// One iteration's worth of buffer-consult/decode/write work, isolated
/// from real sleeping and real clocks so it can be unit tested.
pub fn playback_step(
    buffer: &Mutex<JitterBuffer>,
    decoder: &mut dyn Decoder,
    device: &mut dyn PcmDevice,
    play_at_sender: WireTime,
    samples_per_period: usize,
    channels: u32,
) -> Result<(), MtrxError> {
    let frame = {
        let mut jb = buffer.lock().expect("jitter buffer mutex poisoned");
        jb.consume_at(play_at_sender)
    };

    let pcm_len = samples_per_period * channels as usize;
    let mut pcm = vec![0i16; pcm_len];

    match frame {
        Some(frame) => {
            decoder.decode(&frame.payload, &mut pcm)?;
        }
        None => {
            debug!(?play_at_sender, "no frame due, concealing");
            decoder.conceal(&mut pcm)?;
        }
    }

    let mut bytes = vec![0u8; pcm_len * 2];
    for (i, sample) in pcm.iter().enumerate() {
        bytes[i * 2..i * 2 + 2].copy_from_slice(&sample.to_le_bytes());
    }

    write_with_recovery(device, &bytes)
}

fn write_with_recovery(device: &mut dyn PcmDevice, bytes: &[u8]) -> Result<(), MtrxError> {
    let status = device.status()?;
    handle_device_status(device, status, bytes.len())?;

    match device.write_samples(bytes) {
        Ok(0) => {
            warn!("zero-frame write, re-preparing device");
            device.prepare()?;
        }
        Ok(written) if written < bytes.len() => {
            warn!(written, expected = bytes.len(), "short write to device");
        }
        Ok(_) => {}
        Err(DeviceError::Fatal(e)) => {
            error!(error = %e, "fatal device write error");
            return Err(MtrxError::Device(DeviceError::Fatal(e)));
        }
        Err(e) => return Err(MtrxError::Device(e)),
    }
    Ok(())
}

fn handle_device_status(
    device: &mut dyn PcmDevice,
    status: DeviceStatus,
    frame_bytes_len: usize,
) -> Result<(), MtrxError> {
    if status.delay_frames < -1 {
        warn!(delay = status.delay_frames, "device delay underrun, recovering");
        device.recover()?;
        device.prepare()?;
        return Ok(());
    }
    if status.state_needs_priming {
        let silence = vec![0u8; frame_bytes_len];
        device.write_samples(&silence)?;
    }
    Ok(())
}

/// Sleeps the calling thread until the absolute instant `target`,
/// retrying on `EINTR` (matching `mrx.c`'s
/// `while (clock_nanosleep(...) == EINTR);`).
pub fn sleep_until_absolute(target: WireTime) {
    let ts = libc::timespec {
        tv_sec: target.tv_sec as libc::time_t,
        tv_nsec: target.tv_nsec as i64,
    };
    loop {
        // SAFETY: `ts` is a valid, fully-initialised timespec.
        let ret = unsafe {
            libc::clock_nanosleep(libc::CLOCK_REALTIME, libc::TIMER_ABSTIME, &ts, std::ptr::null_mut())
        };
        if ret == 0 {
            break;
        }
        if ret != libc::EINTR {
            warn!(errno = ret, "clock_nanosleep failed");
            break;
        }
    }
}

pub fn current_time() -> WireTime {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out-pointer for clock_gettime.
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
    }
    WireTime {
        tv_sec: ts.tv_sec as i64,
        tv_nsec: ts.tv_nsec as u32,
    }
}

/// Drives the playback loop until the process is killed. Never
/// returns on success; graceful shutdown is out of scope (spec.md §5).
pub fn run(
    config: &ReceiverConfig,
    buffer: Arc<Mutex<JitterBuffer>>,
    offset: Arc<SharedOffset>,
    mut decoder: Box<dyn Decoder>,
    mut device: Box<dyn PcmDevice>,
    device_buffer_frames: u32,
) -> Result<(), MtrxError> {
    crate::privilege::set_realtime_priority();

    let correction_ns = device_correction_ns(config.delay_ms, device_buffer_frames, config.common.rate);
    let mut grid = ClockGrid::new(config.common.period_ns(), correction_ns);
    let samples_per_period = config.common.samples_per_period();

    loop {
        let offset_ns = offset.load();
        let now_real = current_time();
        let now_sender = now_real.add_nanos(offset_ns);
        let tick_sender = grid.next_tick_after(now_sender);
        let tick_real = tick_sender.add_nanos(-offset_ns);

        sleep_until_absolute(tick_real);

        playback_step(
            &buffer,
            decoder.as_mut(),
            device.as_mut(),
            tick_sender,
            samples_per_period,
            config.common.channels,
        )?;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::NullDevice;
    use crate::error::CodecError;
    use crate::jitter_buffer::InsertOutcome;
    use crate::wire::AudioFrame;

    struct FakeDecoder {
        decoded: Vec<Vec<u8>>,
        concealments: u32,
    }

    impl Decoder for FakeDecoder {
        fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, CodecError> {
            self.decoded.push(payload.to_vec());
            for s in pcm.iter_mut() {
                *s = 1;
            }
            Ok(pcm.len())
        }

        fn conceal(&mut self, pcm: &mut [i16]) -> Result<usize, CodecError> {
            self.concealments += 1;
            for s in pcm.iter_mut() {
                *s = 0;
            }
            Ok(pcm.len())
        }
    }

    fn ts(ms: i64) -> WireTime {
        WireTime {
            tv_sec: ms / 1000,
            tv_nsec: ((ms % 1000) * 1_000_000) as u32,
        }
    }

    #[test]
    fn writes_decoded_frame_when_due() {
        let buffer = Mutex::new(JitterBuffer::new(50));
        {
            let mut jb = buffer.lock().unwrap();
            let outcome = jb.insert(AudioFrame {
                timestamp: ts(100),
                payload: vec![9, 9],
            });
            assert_eq!(outcome, InsertOutcome::Inserted);
        }
        let mut decoder = FakeDecoder {
            decoded: Vec::new(),
            concealments: 0,
        };
        let mut device = NullDevice::new();

        playback_step(&buffer, &mut decoder, &mut device, ts(100), 2, 1).unwrap();

        assert_eq!(decoder.decoded.len(), 1);
        assert_eq!(decoder.concealments, 0);
        assert_eq!(device.written.len(), 2 * 2);
    }

    #[test]
    fn conceals_when_no_frame_due() {
        let buffer = Mutex::new(JitterBuffer::new(50));
        let mut decoder = FakeDecoder {
            decoded: Vec::new(),
            concealments: 0,
        };
        let mut device = NullDevice::new();

        playback_step(&buffer, &mut decoder, &mut device, ts(100), 2, 1).unwrap();

        assert_eq!(decoder.concealments, 1);
        assert_eq!(device.written.len(), 2 * 2);
    }

    #[test]
    fn device_correction_matches_delay_formula() {
        let c = device_correction_ns(80, 0, 48_000);
        assert_eq!(c, -80_000_000);
    }
}
