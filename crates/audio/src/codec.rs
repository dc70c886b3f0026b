//! G.711 mu-law codec and container helpers
//!
//! The telephony leg speaks 8-bit mu-law at 8kHz while the synthesis
//! provider returns 16-bit linear PCM at a higher rate, so outbound audio is
//! decimated and companded in a single pass. Inbound utterances are wrapped
//! in a minimal WAV header because the transcription provider only accepts
//! containerized audio.

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Encode one 16-bit linear PCM sample as a G.711 mu-law byte.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;

    !(sign | (exponent << 4) | mantissa) as u8
}

/// Decode one G.711 mu-law byte to a 16-bit linear PCM sample.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let mu = !byte as i32;
    let sign = mu & 0x80;
    let exponent = (mu >> 4) & 0x07;
    let mantissa = mu & 0x0F;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Decimate PCM from the synthesis rate down to the telephony rate and
/// mu-law encode in one pass. `ratio` is provider rate / 8000 (e.g. 3 for
/// 24kHz input); every Nth sample is kept.
pub fn downsample_and_encode(pcm: &[i16], ratio: usize) -> Vec<u8> {
    debug_assert!(ratio >= 1);
    pcm.iter()
        .step_by(ratio.max(1))
        .map(|&s| linear_to_mulaw(s))
        .collect()
}

/// Wrap raw mu-law bytes in a minimal WAV header (format 7, mono, 8kHz,
/// 8-bit) for the transcription provider.
pub fn wav_container(mulaw: &[u8]) -> Vec<u8> {
    let data_len = mulaw.len() as u32;
    let mut wav = Vec::with_capacity(44 + mulaw.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&7u16.to_le_bytes()); // mu-law format code
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&8000u32.to_le_bytes()); // sample rate
    wav.extend_from_slice(&8000u32.to_le_bytes()); // byte rate
    wav.extend_from_slice(&1u16.to_le_bytes()); // block align
    wav.extend_from_slice(&8u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(mulaw);
    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_vectors() {
        // Positive zero companded as 0xFF, full-scale values at the extremes
        assert_eq!(linear_to_mulaw(0), 0xFF);
        assert_eq!(linear_to_mulaw(-32768), 0x00);
        assert_eq!(linear_to_mulaw(32767), 0x80);
        assert_eq!(mulaw_to_linear(0xFF), 0);
        assert_eq!(mulaw_to_linear(0x00), -32124);
        assert_eq!(mulaw_to_linear(0x80), 32124);
    }

    #[test]
    fn test_round_trip_tolerance() {
        // Quantization error grows with amplitude; G.711 stays within the
        // step size of the containing segment
        for &sample in &[0i16, 1, -1, 100, -100, 1000, -1000, 8000, -8000, 30000, -30000] {
            let decoded = mulaw_to_linear(linear_to_mulaw(sample));
            let err = (decoded as i32 - sample as i32).abs();
            let tolerance = (sample as i32).abs() / 16 + 16;
            assert!(
                err <= tolerance,
                "sample {} decoded to {} (err {})",
                sample,
                decoded,
                err
            );
        }
    }

    #[test]
    fn test_round_trip_idempotent_on_codewords() {
        // Encoding a decoded codeword must reproduce the codeword. 0x7F is
        // negative zero: it decodes to 0, which re-encodes as positive zero.
        for byte in 0u16..=255 {
            let byte = byte as u8;
            if byte == 0x7F {
                assert_eq!(linear_to_mulaw(mulaw_to_linear(byte)), 0xFF);
                continue;
            }
            assert_eq!(linear_to_mulaw(mulaw_to_linear(byte)), byte);
        }
    }

    #[test]
    fn test_downsample_and_encode() {
        let pcm: Vec<i16> = (0..12).map(|i| i * 1000).collect();
        let out = downsample_and_encode(&pcm, 3);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], linear_to_mulaw(0));
        assert_eq!(out[1], linear_to_mulaw(3000));
        assert_eq!(out[3], linear_to_mulaw(9000));
    }

    #[test]
    fn test_wav_container_header() {
        let data = vec![0xFFu8; 160];
        let wav = wav_container(&data);
        assert_eq!(wav.len(), 204);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // format code 7 at offset 20
        assert_eq!(u16::from_le_bytes([wav[20], wav[21]]), 7);
        // mono 8kHz 8-bit
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 8000);
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 8);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 160);
    }
}
