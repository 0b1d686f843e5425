/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! Socket setup, matching `common.c`'s `init_socket`: always marks
//! outgoing traffic DSCP Expedited Forwarding, joins the multicast
//! group on the receiver when the address is a multicast address, and
//! sets `SO_REUSEADDR` only for that receiver-multicast combination.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::SocketError;

const IPTOS_DSCP_EF: u32 = 0xb8;

pub fn is_multicast(addr: Ipv4Addr) -> bool {
    addr.is_multicast()
}

/// Creates the receiver's socket: binds to `port` on all interfaces,
/// joins `addr`'s multicast group if it is one, and sets
/// `SO_REUSEADDR` in that case (so multiple receivers can share a
/// multicast group on one host).
pub fn create_receiver_socket(addr: Ipv4Addr, port: u16) -> Result<UdpSocket, SocketError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(SocketError::Create)?;

    if is_multicast(addr) {
        socket
            .set_reuse_address(true)
            .map_err(|e| SocketError::SetOption("SO_REUSEADDR", e))?;
    }

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket
        .bind(&bind_addr.into())
        .map_err(|e| SocketError::Bind {
            addr: SocketAddr::V4(bind_addr),
            source: e,
        })?;

    if is_multicast(addr) {
        socket
            .join_multicast_v4(&addr, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| SocketError::JoinMulticast(addr, e))?;
    }

    set_tos_ef(&socket)?;
    socket.set_nonblocking(false).map_err(SocketError::Create)?;
    Ok(socket.into())
}

/// Creates the sender's socket: ephemeral local port, no multicast
/// join, no `SO_REUSEADDR` (matches `common.c`: those are mrx-only).
pub fn create_sender_socket() -> Result<UdpSocket, SocketError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(SocketError::Create)?;
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket
        .bind(&bind_addr.into())
        .map_err(|e| SocketError::Bind {
            addr: SocketAddr::V4(bind_addr),
            source: e,
        })?;
    set_tos_ef(&socket)?;
    Ok(socket.into())
}

fn set_tos_ef(socket: &Socket) -> Result<(), SocketError> {
    socket
        .set_tos(IPTOS_DSCP_EF)
        .map_err(|e| SocketError::SetOption("IP_TOS", e))
}
