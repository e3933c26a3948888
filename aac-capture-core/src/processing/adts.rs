//! ADTS (Audio Data Transport Stream) framing for raw AAC units.
//!
//! Each compressed unit is prefixed with a 7-byte header (no CRC) so the
//! resulting `.aac` file is self-synchronising and plays without a container.
//!
//! Layout (bit widths in parentheses):
//! ```text
//! [0]   syncword high (8)            = 0xFF
//! [1]   syncword low (4) | ID (1) | layer (2) | protection_absent (1) = 0xF9
//! [2]   profile (2) | sf_index (4) | private (1) | channel_config high (1)
//! [3]   channel_config low (2) | orig/home/copyright (4) | frame_length high (2)
//! [4]   frame_length mid (8)
//! [5]   frame_length low (3) | buffer_fullness high (5)
//! [6]   buffer_fullness low (6) | raw_blocks (2)
//! ```

use crate::models::audio_models::AacProfile;
use crate::models::error::RecorderError;

/// Size of an ADTS header without CRC.
pub const ADTS_HEADER_SIZE: usize = 7;

/// Largest value the 13-bit frame_length field can carry.
pub const MAX_FRAME_LENGTH: usize = 0x1FFF;

/// Standard MPEG-4 sampling frequency table; position is the ADTS index.
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Index of `sample_rate` in the standard sampling frequency table.
pub fn sampling_frequency_index(sample_rate: u32) -> Option<u8> {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|index| index as u8)
}

/// Build the 7-byte ADTS header for a packet of `packet_len` bytes
/// (header included).
///
/// Buffer fullness is fixed at 0x7FF (VBR) and one raw data block is
/// signalled per frame.
pub fn build_header(
    profile: AacProfile,
    sample_rate: u32,
    channel_config: u8,
    packet_len: usize,
) -> Result<[u8; ADTS_HEADER_SIZE], RecorderError> {
    let freq_index = sampling_frequency_index(sample_rate)
        .ok_or_else(|| RecorderError::InvalidHeader(format!("unsupported sample rate {}", sample_rate)))?;
    if channel_config > 7 {
        return Err(RecorderError::InvalidHeader(format!(
            "channel configuration {} does not fit in 3 bits",
            channel_config
        )));
    }
    if !(ADTS_HEADER_SIZE..=MAX_FRAME_LENGTH).contains(&packet_len) {
        return Err(RecorderError::InvalidHeader(format!(
            "frame length {} outside {}..={}",
            packet_len, ADTS_HEADER_SIZE, MAX_FRAME_LENGTH
        )));
    }

    let profile_bits = profile.object_type() - 1;
    let len = packet_len as u16;

    Ok([
        0xFF,
        0xF9,
        (profile_bits << 6) | (freq_index << 2) | (channel_config >> 2),
        ((channel_config & 0x3) << 6) | (len >> 11) as u8,
        ((len & 0x7FF) >> 3) as u8,
        (((len & 0x7) as u8) << 5) | 0x1F,
        0xFC,
    ])
}

/// Prefix `payload` with its ADTS header, producing one complete packet.
pub fn frame_packet(
    profile: AacProfile,
    sample_rate: u32,
    channel_config: u8,
    payload: &[u8],
) -> Result<Vec<u8>, RecorderError> {
    let packet_len = payload.len() + ADTS_HEADER_SIZE;
    let header = build_header(profile, sample_rate, channel_config, packet_len)?;

    let mut packet = Vec::with_capacity(packet_len);
    packet.extend_from_slice(&header);
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Read the frame_length field back out of a header.
pub fn frame_length(header: &[u8]) -> Option<usize> {
    if header.len() < ADTS_HEADER_SIZE || header[0] != 0xFF || header[1] & 0xF0 != 0xF0 {
        return None;
    }
    let len = ((header[3] as usize & 0x3) << 11) | ((header[4] as usize) << 3) | (header[5] as usize >> 5);
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_table_indices() {
        assert_eq!(sampling_frequency_index(96000), Some(0));
        assert_eq!(sampling_frequency_index(48000), Some(3));
        assert_eq!(sampling_frequency_index(44100), Some(4));
        assert_eq!(sampling_frequency_index(16000), Some(8));
        assert_eq!(sampling_frequency_index(7350), Some(12));
        assert_eq!(sampling_frequency_index(44000), None);
    }

    #[test]
    fn lc_44k_mono_header_bytes() {
        // 100-byte payload + 7-byte header = 107 (0b000_0000_1101_011)
        let header = build_header(AacProfile::LowComplexity, 44100, 1, 107).unwrap();
        assert_eq!(header, [0xFF, 0xF9, 0x50, 0x40, 0x0D, 0x7F, 0xFC]);
    }

    #[test]
    fn long_frame_sets_high_length_bits() {
        // 8191 = 0b11_11111111_111
        let header = build_header(AacProfile::LowComplexity, 48000, 2, MAX_FRAME_LENGTH).unwrap();
        assert_eq!(header[2], 0x4C);
        assert_eq!(header[3], 0x80 | 0x03);
        assert_eq!(header[4], 0xFF);
        assert_eq!(header[5], 0xFF);
    }

    #[test]
    fn channel_config_high_bit_lands_in_byte_two() {
        let header = build_header(AacProfile::Main, 22050, 6, 20).unwrap();
        // profile 0, index 7, channel config 0b110
        assert_eq!(header[2], (7 << 2) | 1);
        assert_eq!(header[3] >> 6, 0b10);
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(build_header(AacProfile::LowComplexity, 44100, 1, MAX_FRAME_LENGTH + 1).is_err());
        assert!(build_header(AacProfile::LowComplexity, 44100, 1, 6).is_err());
        assert!(build_header(AacProfile::LowComplexity, 44100, 8, 100).is_err());
        assert!(matches!(
            build_header(AacProfile::LowComplexity, 44000, 1, 100),
            Err(RecorderError::InvalidHeader(_))
        ));
    }

    #[test]
    fn framed_packet_is_payload_plus_seven() {
        for payload_len in [0usize, 1, 186, 371, 1024] {
            let payload = vec![0xA5; payload_len];
            let packet = frame_packet(AacProfile::LowComplexity, 44100, 1, &payload).unwrap();
            assert_eq!(packet.len(), payload_len + ADTS_HEADER_SIZE);
            assert_eq!(&packet[0..2], &[0xFF, 0xF9]);
            assert_eq!(frame_length(&packet), Some(packet.len()));
            assert_eq!(&packet[ADTS_HEADER_SIZE..], payload.as_slice());
        }
    }

    #[test]
    fn frame_length_rejects_garbage() {
        assert_eq!(frame_length(&[0u8; 7]), None);
        assert_eq!(frame_length(&[0xFF, 0xF9]), None);
    }
}
