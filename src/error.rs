/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while validating CLI input into a [`crate::Config`].
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown sample format {0:?}, expected 0 (S16) or 1 (float)")]
    InvalidSampleFormat(u8),

    #[error("channel count must be at least 1, got {0}")]
    InvalidChannels(u32),

    #[error("packet duration must be > 0 ms, got {0}")]
    InvalidPeriod(u32),

    #[error("{0}: RTP output and time-sync cannot both be enabled")]
    RtpAndTimeSyncConflict(&'static str),
}

/// Socket setup and I/O errors.
#[derive(Debug, Error, Diagnostic)]
pub enum SocketError {
    #[error("failed to create socket: {0}")]
    Create(#[source] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to join multicast group {0}: {1}")]
    JoinMulticast(std::net::Ipv4Addr, #[source] std::io::Error),

    #[error("failed to set socket option {0}: {1}")]
    SetOption(&'static str, #[source] std::io::Error),

    #[error("send/recv failed: {0}")]
    Io(#[source] std::io::Error),
}

/// PCM device errors (ALSA-class interface).
#[derive(Debug, Error, Diagnostic)]
pub enum DeviceError {
    #[error("failed to open device {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to configure hw/sw params on {device}: {source}")]
    Configure {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecoverable device error: {0}")]
    Fatal(#[source] std::io::Error),

    #[error("short I/O on {device}: expected {expected} frames, got {actual}")]
    ShortIo {
        device: String,
        expected: usize,
        actual: usize,
    },
}

/// Opus encode/decode errors.
#[derive(Debug, Error, Diagnostic)]
pub enum CodecError {
    #[error("failed to create encoder: {0}")]
    EncoderCreate(String),

    #[error("failed to create decoder: {0}")]
    DecoderCreate(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Privilege-drop and realtime-scheduling setup errors.
#[derive(Debug, Error, Diagnostic)]
pub enum PrivilegeError {
    #[error("user 'nobody' not found")]
    NoSuchUser,

    #[error("setgid failed: {0}")]
    SetGid(#[source] std::io::Error),

    #[error("setuid failed: {0}")]
    SetUid(#[source] std::io::Error),
}

/// Top-level aggregate error reported at the process boundary.
#[derive(Debug, Error, Diagnostic)]
pub enum MtrxError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MtrxResult<T> = std::result::Result<T, MtrxError>;
