/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! Sender entry point: binds the socket, opens the capture device and
//! Opus encoder, optionally spawns the time-sync reply thread, prints
//! the SDP description for the RTP path, then runs the capture loop on
//! the main thread.

use std::net::SocketAddrV4;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use mtrx::capture;
use mtrx::codec::OpusEncoderImpl;
use mtrx::config::{SenderArgs, SenderConfig};
use mtrx::device::{AlsaDevice, PcmDevice, PcmDirection, StdioDevice};
use mtrx::error::{MtrxError, SocketError};
use mtrx::net;
use mtrx::rtp::RtpState;
use mtrx::sdp;
use mtrx::wire::{PacketKind, TimeRequest};
use tracing::{info, warn};

fn main() -> miette::Result<()> {
    let args = SenderArgs::parse();
    let config = SenderConfig::from_args(args)
        .map_err(MtrxError::Config)
        .map_err(miette::Report::from)?;

    let filter = if config.common.verbose > 0 { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    run(config).map_err(miette::Report::from)
}

fn run(config: SenderConfig) -> Result<(), MtrxError> {
    info!(addr = %config.common.addr, port = config.common.port, "starting sender");

    let socket = net::create_sender_socket()?;
    let target = SocketAddrV4::new(config.common.addr, config.common.port);

    if config.common.time_sync {
        spawn_time_sync_thread(&socket)?;
    }

    if config.rtp {
        print!("{}", sdp::session_description(config.common.addr, config.common.port, config.common.channels));
    }

    let device: Box<dyn PcmDevice> = open_device(&config)?;
    let encoder = Box::new(OpusEncoderImpl::new(
        config.common.rate,
        config.common.channels,
        config.kbps,
    )?);

    let rtp = config.rtp.then(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
            .unwrap_or(0);
        RtpState::new(seed, config.common.samples_per_period() as u32)
    });

    capture::run(&config, &socket, target, device, encoder, rtp)
}

fn open_device(config: &SenderConfig) -> Result<Box<dyn PcmDevice>, MtrxError> {
    if config.common.device == "-" {
        return Ok(Box::new(StdioDevice::new(PcmDirection::Capture)));
    }
    let samples_per_period = config.common.samples_per_period() as u64;
    let device = AlsaDevice::open(
        &config.common.device,
        PcmDirection::Capture,
        config.common.rate,
        config.common.channels,
        config.common.format,
        samples_per_period,
        config.common.buffer_mult,
    )?;
    Ok(Box::new(device))
}

/// Spawns the thread that answers receiver-initiated time-sync
/// requests on the shared socket (spec.md §4.6, `time_sync_thread` in
/// `mtx.c`).
fn spawn_time_sync_thread(socket: &std::net::UdpSocket) -> Result<(), MtrxError> {
    let reply_socket = socket.try_clone().map_err(SocketError::Create)?;
    std::thread::Builder::new()
        .name("mtx-timesync".into())
        .spawn(move || {
            let mut buf = [0u8; 12];
            loop {
                let (len, from) = match reply_socket.recv_from(&mut buf) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "time-sync socket recv failed");
                        continue;
                    }
                };
                if mtrx::wire::classify(len) != PacketKind::TimeRequest {
                    continue;
                }
                let Some(request) = TimeRequest::decode(&buf[..len]) else {
                    continue;
                };
                let now = mtrx::playback::current_time();
                let reply = mtrx::time_sync::build_reply(request, now);
                let _ = reply_socket.send_to(&reply.encode(), from);
            }
        })
        .expect("failed to spawn time-sync thread");
    Ok(())
}
