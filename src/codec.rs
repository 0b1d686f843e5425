/*
 *  Copyright (C) 2025 mtrx-rs contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as
 *  published by the Free Software Foundation, either version 3 of the
 *  License, or (at your option) any later version.
 */

//! The Opus encoder/decoder boundary. Core scheduling code only depends
//! on [`Encoder`]/[`Decoder`]; the Opus specifics live here, bound
//! against the `audiopus` crate.

use audiopus::coder::{Decoder as OpusDecoder, Encoder as OpusEncoder};
use audiopus::{Application, Bitrate, Channels, SampleRate};

use crate::error::CodecError;

fn channels_from(n: u32) -> Result<Channels, CodecError> {
    match n {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        other => Err(CodecError::EncoderCreate(format!(
            "opus only supports 1 or 2 channels, got {other}"
        ))),
    }
}

fn sample_rate_from(rate: u32) -> Result<SampleRate, CodecError> {
    match rate {
        8_000 => Ok(SampleRate::Hz8000),
        12_000 => Ok(SampleRate::Hz12000),
        16_000 => Ok(SampleRate::Hz16000),
        24_000 => Ok(SampleRate::Hz24000),
        48_000 => Ok(SampleRate::Hz48000),
        other => Err(CodecError::EncoderCreate(format!(
            "unsupported opus sample rate {other}"
        ))),
    }
}

/// Encodes PCM frames captured from the device into Opus payloads.
pub trait Encoder: Send {
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError>;
}

/// Decodes Opus payloads into PCM, with packet-loss concealment when no
/// payload is available (spec.md §4.4 step 7).
pub trait Decoder: Send {
    fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, CodecError>;
    fn conceal(&mut self, pcm: &mut [i16]) -> Result<usize, CodecError>;
}

pub struct OpusEncoderImpl {
    inner: OpusEncoder,
}

impl OpusEncoderImpl {
    pub fn new(rate: u32, channels: u32, kbps: u32) -> Result<OpusEncoderImpl, CodecError> {
        let mut inner = OpusEncoder::new(
            sample_rate_from(rate)?,
            channels_from(channels)?,
            Application::Audio,
        )
        .map_err(|e| CodecError::EncoderCreate(e.to_string()))?;
        inner
            .set_bitrate(Bitrate::BitsPerSecond((kbps * 1000) as i32))
            .map_err(|e| CodecError::EncoderCreate(e.to_string()))?;
        inner
            .set_complexity(9)
            .map_err(|e| CodecError::EncoderCreate(e.to_string()))?;
        Ok(OpusEncoderImpl { inner })
    }
}

impl Encoder for OpusEncoderImpl {
    fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, CodecError> {
        self.inner
            .encode(pcm, out)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }
}

pub struct OpusDecoderImpl {
    inner: OpusDecoder,
}

impl OpusDecoderImpl {
    pub fn new(rate: u32, channels: u32) -> Result<OpusDecoderImpl, CodecError> {
        let inner = OpusDecoder::new(sample_rate_from(rate)?, channels_from(channels)?)
            .map_err(|e| CodecError::DecoderCreate(e.to_string()))?;
        Ok(OpusDecoderImpl { inner })
    }
}

impl Decoder for OpusDecoderImpl {
    fn decode(&mut self, payload: &[u8], pcm: &mut [i16]) -> Result<usize, CodecError> {
        self.inner
            .decode(Some(payload), pcm, false)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn conceal(&mut self, pcm: &mut [i16]) -> Result<usize, CodecError> {
        self.inner
            .decode(None, pcm, true)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_unsupported_channel_count() {
        assert!(channels_from(3).is_err());
        assert!(channels_from(1).is_ok());
        assert!(channels_from(2).is_ok());
    }

    #[test]
    fn rejects_unsupported_sample_rate() {
        assert!(sample_rate_from(44_100).is_err());
        assert!(sample_rate_from(48_000).is_ok());
    }
}
