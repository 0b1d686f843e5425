/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! SDP session description printed to stdout when the sender emits RTP
//! (spec.md §4.5), matching `mtx.c`'s hardcoded field values.

use std::net::Ipv4Addr;

pub fn session_description(addr: Ipv4Addr, port: u16, channels: u32) -> String {
    format!(
        "v=0\r\n\
         o=- 0 0 IN IP4 127.0.0.1\r\n\
         s=No Name\r\n\
         c=IN IP4 {addr}\r\n\
         t=0 0\r\n\
         a=tool:mtx\r\n\
         m=audio {port} RTP/AVP 96\r\n\
         b=AS:96\r\n\
         a=rtpmap:96 opus/48000/{channels}\r\n\
         a=fmtp:96 sprop-stereo={stereo}\r\n\
         a=control:streamid=0\r\n",
        stereo = if channels > 1 { 1 } else { 0 },
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_stereo_flag() {
        let sdp = session_description(Ipv4Addr::new(239, 48, 48, 1), 1350, 2);
        assert!(sdp.contains("a=fmtp:96 sprop-stereo=1"));
        assert!(sdp.contains("m=audio 1350 RTP/AVP 96"));
    }

    #[test]
    fn renders_mono_flag() {
        let sdp = session_description(Ipv4Addr::new(239, 48, 48, 1), 1350, 1);
        assert!(sdp.contains("a=fmtp:96 sprop-stereo=0"));
    }
}
