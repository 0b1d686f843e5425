/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! Receiver entry point: binds the socket, spawns the playback thread,
//! and runs the network-receive loop (jitter buffer insert plus the
//! receiver side of time-sync) on the main thread.

use std::sync::{Arc, Mutex};

use clap::Parser;
use mtrx::codec::OpusDecoderImpl;
use mtrx::config::{ReceiverArgs, ReceiverConfig};
use mtrx::device::{AlsaDevice, PcmDevice, PcmDirection, StdioDevice};
use mtrx::error::{MtrxError, SocketError};
use mtrx::jitter_buffer::JitterBuffer;
use mtrx::net;
use mtrx::playback;
use mtrx::time_sync::{self, SharedOffset};
use mtrx::wire::{self, AudioFrame, PacketKind, TimeReply, WireTime};
use tracing::{debug, info, warn};

fn main() -> miette::Result<()> {
    let args = ReceiverArgs::parse();
    let config = ReceiverConfig::from_args(args)
        .map_err(MtrxError::Config)
        .map_err(miette::Report::from)?;

    let filter = if config.common.verbose > 0 { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    run(config).map_err(miette::Report::from)
}

fn run(config: ReceiverConfig) -> Result<(), MtrxError> {
    info!(addr = %config.common.addr, port = config.common.port, "starting receiver");

    let socket = net::create_receiver_socket(config.common.addr, config.common.port)?;

    let buffer = Arc::new(Mutex::new(JitterBuffer::new(config.max_entries())));
    let offset = Arc::new(SharedOffset::new());

    let device_buffer_frames =
        config.common.samples_per_period() as u32 * config.common.buffer_mult;

    let playback_device: Box<dyn PcmDevice> = open_device(&config, PcmDirection::Playback)?;
    let decoder = Box::new(OpusDecoderImpl::new(config.common.rate, config.common.channels)?);

    let playback_buffer = buffer.clone();
    let playback_offset = offset.clone();
    let playback_config = config.clone();
    let playback_handle = std::thread::Builder::new()
        .name("mrx-playback".into())
        .spawn(move || {
            if let Err(e) = playback::run(
                &playback_config,
                playback_buffer,
                playback_offset,
                decoder,
                playback_device,
                device_buffer_frames,
            ) {
                tracing::error!(error = ?e, "playback thread exited with fatal error");
                std::process::exit(1);
            }
        })
        .expect("failed to spawn playback thread");

    mtrx::privilege::drop_privileges_if_root()?;

    network_loop(&config, &socket, buffer, offset)?;

    // Graceful shutdown is out of scope; reaching here means the
    // network loop returned, which only happens on a fatal error.
    drop(playback_handle);
    Ok(())
}

fn open_device(
    config: &ReceiverConfig,
    direction: PcmDirection,
) -> Result<Box<dyn PcmDevice>, MtrxError> {
    if config.common.device == "-" {
        return Ok(Box::new(StdioDevice::new(direction)));
    }
    let samples_per_period = config.common.samples_per_period() as u64;
    let device = AlsaDevice::open(
        &config.common.device,
        direction,
        config.common.rate,
        config.common.channels,
        config.common.format,
        samples_per_period,
        config.common.buffer_mult,
    )?;
    Ok(Box::new(device))
}

fn network_loop(
    config: &ReceiverConfig,
    socket: &std::net::UdpSocket,
    buffer: Arc<Mutex<JitterBuffer>>,
    offset: Arc<SharedOffset>,
) -> Result<(), MtrxError> {
    let mut last_time_sent: Option<WireTime> = None;
    let mut buf = vec![0u8; 65536];

    loop {
        let (len, from) = socket
            .recv_from(&mut buf)
            .map_err(|e| MtrxError::Socket(SocketError::Io(e)))?;
        let datagram = &buf[..len];
        let now = playback::current_time();

        match wire::classify(len) {
            PacketKind::TimeReply => {
                if let Some(reply) = TimeReply::decode(datagram) {
                    handle_reply(reply, last_time_sent, now, &offset);
                } else {
                    warn!("malformed time reply, dropping");
                }
            }
            PacketKind::TimeRequest => {
                debug!("ignoring stray time request on receiver socket");
            }
            PacketKind::Audio => {
                if let Some(frame) = AudioFrame::decode(datagram) {
                    let mut jb = buffer.lock().expect("jitter buffer mutex poisoned");
                    jb.insert(frame);
                    drop(jb);
                } else {
                    warn!("malformed audio frame, dropping");
                }

                if time_sync::should_send_request(config.common.time_sync, last_time_sent, now) {
                    last_time_sent = Some(now);
                    let request = wire::TimeRequest { t1: now };
                    let _ = socket.send_to(&request.encode(), from);
                }
            }
        }
    }
}

fn handle_reply(reply: TimeReply, last_time_sent: Option<WireTime>, now: WireTime, offset: &SharedOffset) {
    let Some(last_time_sent) = last_time_sent else {
        warn!("time reply received with no outstanding request, dropping");
        return;
    };
    match time_sync::estimate_offset(reply, last_time_sent, now) {
        Some(offset_ns) => {
            debug!(offset_ns, "updated clock offset");
            offset.store(offset_ns);
        }
        None => warn!("invalid time reply received, dropping"),
    }
}
