/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! The PCM device boundary (ALSA-class interface, spec.md §4.4/§4.5).
//!
//! `PcmDevice` is the trait the schedulers depend on; `AlsaDevice` is
//! the real backend (mirroring `common.c`'s `snd_my_init`), `StdioDevice`
//! backs the `-` device, and `NullDevice` is a test double that counts
//! bytes instead of touching hardware.

use alsa::pcm::{Access, Format, HwParams, State, PCM};
use alsa::{Direction, ValueOr};
use tracing::warn;

use crate::config::SampleFormat;
use crate::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmDirection {
    Playback,
    Capture,
}

/// Current avail/delay reading from the device.
#[derive(Debug, Clone, Copy)]
pub struct DeviceStatus {
    pub avail_frames: i64,
    pub delay_frames: i64,
    pub state_needs_priming: bool,
}

pub trait PcmDevice: Send {
    fn status(&mut self) -> Result<DeviceStatus, DeviceError>;
    fn write_samples(&mut self, buf: &[u8]) -> Result<usize, DeviceError>;
    fn read_samples(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;
    fn recover(&mut self) -> Result<(), DeviceError>;
    fn prepare(&mut self) -> Result<(), DeviceError>;
}

/// Real ALSA-backed device, configured the way `snd_my_init` configures
/// `common.c`'s handle: `rate_resample` off, interleaved access, the
/// requested sample format, buffer sized to `period * buffer_mult`.
pub struct AlsaDevice {
    pcm: PCM,
    frame_size: usize,
}

impl AlsaDevice {
    pub fn open(
        device: &str,
        direction: PcmDirection,
        rate: u32,
        channels: u32,
        format: SampleFormat,
        period_frames: u64,
        buffer_mult: u32,
    ) -> Result<AlsaDevice, DeviceError> {
        let alsa_dir = match direction {
            PcmDirection::Playback => Direction::Playback,
            PcmDirection::Capture => Direction::Capture,
        };
        let pcm = PCM::new(device, alsa_dir, false).map_err(|e| DeviceError::Open {
            device: device.to_string(),
            source: std::io::Error::other(e.to_string()),
        })?;

        {
            let hwp = HwParams::any(&pcm).map_err(|e| DeviceError::Configure {
                device: device.to_string(),
                source: std::io::Error::other(e.to_string()),
            })?;
            hwp.set_rate_resample(false).ok();
            hwp.set_access(Access::RWInterleaved)
                .map_err(|e| cfg_err(device, e))?;
            let alsa_format = match format {
                SampleFormat::S16 => Format::s16(),
                SampleFormat::Float => Format::float(),
            };
            hwp.set_format(alsa_format).map_err(|e| cfg_err(device, e))?;
            hwp.set_rate(rate, ValueOr::Nearest)
                .map_err(|e| cfg_err(device, e))?;
            hwp.set_channels(channels).map_err(|e| cfg_err(device, e))?;
            hwp.set_period_size_near((period_frames) as i64, ValueOr::Nearest)
                .map_err(|e| cfg_err(device, e))?;
            hwp.set_buffer_size_near((period_frames * buffer_mult as u64) as i64)
                .map_err(|e| cfg_err(device, e))?;
            pcm.hw_params(&hwp).map_err(|e| cfg_err(device, e))?;
        }

        {
            let swp = pcm.sw_params_current().map_err(|e| cfg_err(device, e))?;
            let buffer_frames = period_frames * buffer_mult as u64;
            let (start_threshold, stop_threshold) = match direction {
                PcmDirection::Playback => (buffer_frames, buffer_frames - period_frames),
                PcmDirection::Capture => (period_frames, buffer_frames),
            };
            swp.set_start_threshold(start_threshold as alsa::pcm::Frames)
                .map_err(|e| cfg_err(device, e))?;
            swp.set_stop_threshold(stop_threshold as alsa::pcm::Frames)
                .map_err(|e| cfg_err(device, e))?;
            pcm.sw_params(&swp).map_err(|e| cfg_err(device, e))?;
        }

        let frame_size = channels as usize * format.bytes_per_sample();
        Ok(AlsaDevice { pcm, frame_size })
    }
}

fn cfg_err(device: &str, e: alsa::Error) -> DeviceError {
    DeviceError::Configure {
        device: device.to_string(),
        source: std::io::Error::other(e.to_string()),
    }
}

impl PcmDevice for AlsaDevice {
    fn status(&mut self) -> Result<DeviceStatus, DeviceError> {
        let avail = self.pcm.avail_update().unwrap_or(-1);
        let delay = self.pcm.delay().unwrap_or(-1);
        let state = self.pcm.state();
        Ok(DeviceStatus {
            avail_frames: avail,
            delay_frames: delay,
            state_needs_priming: matches!(state, State::Setup | State::Prepared),
        })
    }

    fn write_samples(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
        let io = self.pcm.io_bytes();
        match io.writei(buf) {
            Ok(frames) => Ok(frames * self.frame_size),
            Err(e) => {
                if let Some(errno) = e.errno() {
                    if errno as i32 == libc::EPIPE {
                        self.recover()?;
                        return Ok(0);
                    }
                }
                Err(DeviceError::Fatal(std::io::Error::other(e.to_string())))
            }
        }
    }

    fn read_samples(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let io = self.pcm.io_bytes();
        match io.readi(buf) {
            Ok(frames) => Ok(frames * self.frame_size),
            Err(e) => {
                if let Some(errno) = e.errno() {
                    if errno as i32 == libc::EPIPE {
                        self.recover()?;
                        return Ok(0);
                    }
                }
                Err(DeviceError::Fatal(std::io::Error::other(e.to_string())))
            }
        }
    }

    fn recover(&mut self) -> Result<(), DeviceError> {
        self.pcm.recover(libc::EPIPE, true).map_err(|e| {
            warn!(error = %e, "device recover failed");
            DeviceError::Fatal(std::io::Error::other(e.to_string()))
        })?;
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.pcm
            .prepare()
            .map_err(|e| DeviceError::Fatal(std::io::Error::other(e.to_string())))
    }
}

/// Stdin/stdout-backed device for `-d -`, matching `mrx.c`/`mtx.c`'s
/// fallback path when no ALSA device is configured.
pub struct StdioDevice {
    _direction: PcmDirection,
}

impl StdioDevice {
    pub fn new(direction: PcmDirection) -> StdioDevice {
        StdioDevice {
            _direction: direction,
        }
    }
}

impl PcmDevice for StdioDevice {
    fn status(&mut self) -> Result<DeviceStatus, DeviceError> {
        Ok(DeviceStatus {
            avail_frames: i64::MAX,
            delay_frames: 0,
            state_needs_priming: false,
        })
    }

    fn write_samples(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
        use std::io::Write;
        let mut stdout = std::io::stdout().lock();
        let mut written = 0;
        while written < buf.len() {
            match stdout.write(&buf[written..]) {
                Ok(0) => {
                    return Err(DeviceError::ShortIo {
                        device: "-".into(),
                        expected: buf.len(),
                        actual: written,
                    })
                }
                Ok(n) => written += n,
                Err(e) => return Err(DeviceError::Fatal(e)),
            }
        }
        Ok(written)
    }

    fn read_samples(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        use std::io::Read;
        let mut stdin = std::io::stdin().lock();
        let mut read = 0;
        while read < buf.len() {
            match stdin.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) => return Err(DeviceError::Fatal(e)),
            }
        }
        Ok(read)
    }

    fn recover(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// In-memory test double used by unit tests exercising the schedulers
/// without real hardware or stdio.
#[cfg(test)]
pub struct NullDevice {
    pub written: Vec<u8>,
    pub to_read: std::collections::VecDeque<u8>,
}

#[cfg(test)]
impl NullDevice {
    pub fn new() -> NullDevice {
        NullDevice {
            written: Vec::new(),
            to_read: std::collections::VecDeque::new(),
        }
    }
}

#[cfg(test)]
impl PcmDevice for NullDevice {
    fn status(&mut self) -> Result<DeviceStatus, DeviceError> {
        Ok(DeviceStatus {
            avail_frames: i64::MAX,
            delay_frames: 0,
            state_needs_priming: false,
        })
    }

    fn write_samples(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn read_samples(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        for slot in buf.iter_mut() {
            *slot = self.to_read.pop_front().unwrap_or(0);
        }
        Ok(buf.len())
    }

    fn recover(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}
