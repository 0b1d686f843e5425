/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! CLI parsing and the immutable configuration derived from it.
//!
//! Mirrors the flag table in `mtrx.h`/`mrx.c`/`mtx.c`: both roles share a
//! common set of flags, each role adds a few of its own. Parsing happens
//! once at start-up; everything downstream takes an immutable [`Config`]
//! (or the role-specific wrapper) by reference, never a global.

use std::net::Ipv4Addr;

use clap::{Parser, ValueEnum};

use crate::error::ConfigError;

/// PCM sample representation used at the device boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SampleFormat {
    /// Signed 16-bit PCM (ALSA `S16_LE`).
    S16,
    /// 32-bit float PCM (ALSA `FLOAT_LE`).
    Float,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::Float => 4,
        }
    }
}

/// Flags common to both `mtx` and `mrx`.
#[derive(Debug, Parser, Clone)]
pub struct CommonArgs {
    /// Multicast or unicast group address.
    #[arg(short = 'h', long = "addr", default_value = "239.48.48.1")]
    pub addr: Ipv4Addr,

    /// UDP port.
    #[arg(short = 'p', long = "port", default_value_t = 1350)]
    pub port: u16,

    /// ALSA device name, or `-` for stdin/stdout.
    #[arg(short = 'd', long = "device", default_value = "default")]
    pub device: String,

    /// Sample format: s16 or float.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = SampleFormat::S16)]
    pub format: SampleFormat,

    /// Sample rate in Hz.
    #[arg(short = 'r', long = "rate", default_value_t = 48_000)]
    pub rate: u32,

    /// Channel count.
    #[arg(short = 'c', long = "channels", default_value_t = 2)]
    pub channels: u32,

    /// Audio packet duration in milliseconds.
    #[arg(short = 't', long = "period-ms", default_value_t = 20)]
    pub period_ms: u32,

    /// ALSA buffer size as a multiple of the period.
    #[arg(short = 'b', long = "buffer-mult", default_value_t = 3)]
    pub buffer_mult: u32,

    /// Enable the time-sync protocol.
    #[arg(short = 'T', long = "time-sync", default_value_t = true)]
    pub time_sync: bool,

    /// Verbosity: 0 = info, 1 = debug.
    #[arg(short = 'v', long = "verbose", default_value_t = 0)]
    pub verbose: u8,
}

/// `mtx` (sender)-only flags.
#[derive(Debug, Parser, Clone)]
pub struct SenderArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Opus bitrate in kbit/s.
    #[arg(short = 'k', long = "kbps", default_value_t = 128)]
    pub kbps: u32,

    /// Send RTP instead of the native AudioFrame/TimeSync framing.
    #[arg(short = 'R', long = "rtp", default_value_t = false)]
    pub rtp: bool,
}

/// `mrx` (receiver)-only flags.
#[derive(Debug, Parser, Clone)]
pub struct ReceiverArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Target playback delay in milliseconds.
    #[arg(short = 'e', long = "delay-ms", default_value_t = 80)]
    pub delay_ms: u32,
}

/// Fields shared by sender and receiver after validation.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub device: String,
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u32,
    pub period_ms: u32,
    pub buffer_mult: u32,
    pub time_sync: bool,
    pub verbose: u8,
}

impl Config {
    pub fn samples_per_period(&self) -> usize {
        (self.period_ms as usize * self.rate as usize) / 1000
    }

    pub fn period_ns(&self) -> i64 {
        self.period_ms as i64 * 1_000_000
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    fn from_common(c: CommonArgs) -> Result<Self, ConfigError> {
        if c.channels == 0 {
            return Err(ConfigError::InvalidChannels(c.channels));
        }
        if c.period_ms == 0 {
            return Err(ConfigError::InvalidPeriod(c.period_ms));
        }
        Ok(Config {
            addr: c.addr,
            port: c.port,
            device: c.device,
            format: c.format,
            rate: c.rate,
            channels: c.channels,
            period_ms: c.period_ms,
            buffer_mult: c.buffer_mult,
            time_sync: c.time_sync,
            verbose: c.verbose,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub common: Config,
    pub kbps: u32,
    pub rtp: bool,
}

impl SenderConfig {
    pub fn from_args(args: SenderArgs) -> Result<Self, ConfigError> {
        if args.rtp && args.common.time_sync {
            return Err(ConfigError::RtpAndTimeSyncConflict(
                "RTP framing carries no sender wall clock",
            ));
        }
        Ok(SenderConfig {
            common: Config::from_common(args.common)?,
            kbps: args.kbps,
            rtp: args.rtp,
        })
    }

    pub fn bytes_per_opus_frame(&self) -> usize {
        (self.kbps as usize * self.common.period_ms as usize) / 8
    }
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub common: Config,
    pub delay_ms: u32,
}

impl ReceiverConfig {
    pub fn from_args(args: ReceiverArgs) -> Result<Self, ConfigError> {
        Ok(ReceiverConfig {
            common: Config::from_common(args.common)?,
            delay_ms: args.delay_ms,
        })
    }

    /// `MAX_ENTRIES = delay_ms < 150 ? 50 : delay_ms / 3` (spec.md data model invariant 3).
    pub fn max_entries(&self) -> usize {
        if self.delay_ms < 150 {
            50
        } else {
            (self.delay_ms / 3) as usize
        }
    }
}
