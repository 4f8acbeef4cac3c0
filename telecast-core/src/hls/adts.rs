//! Inline ADTS header parsing (: "AAC ADTS parsed inline
//! (profile, sampling-rate index, channel cfg, frame length); used to
//! build MP4 `mp4a` sample entries").

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsFrame {
    /// MPEG-4 Audio Object Type (AAC LC = 2, the only profile this system
    /// expects from ARIB broadcast audio).
    pub profile: u8,
    pub sample_rate: u32,
    pub channels: u16,
    /// Total frame length including the 7- or 9-byte ADTS header.
    pub frame_length: usize,
}

/// Parses one ADTS frame header starting at `data[0]`. Returns `None` on a
/// bad syncword or an out-of-range sampling-frequency index rather than
/// panicking — a torn PES boundary should just be dropped.
pub fn parse_adts_header(data: &[u8]) -> Option<AdtsFrame> {
    if data.len() < 7 {
        return None;
    }
    if data[0] != 0xFF || (data[1] & 0xF0) != 0xF0 {
        return None;
    }
    let profile = ((data[2] >> 6) & 0x03) + 1; // ADTS encodes AOT-1
    let sampling_index = (data[2] >> 2) & 0x0F;
    let sample_rate = *SAMPLE_RATES.get(sampling_index as usize)?;
    let channel_config = ((data[2] & 0x01) << 2) | ((data[3] >> 6) & 0x03);
    let frame_length = (((data[3] & 0x03) as usize) << 11)
        | ((data[4] as usize) << 3)
        | ((data[5] as usize) >> 5);
    if frame_length < 7 || frame_length > data.len() {
        return None;
    }
    Some(AdtsFrame { profile, sample_rate, channels: channel_config as u16, frame_length })
}

/// Builds the 2-byte `AudioSpecificConfig` MP4 wants in `esds` from an
/// ADTS frame's already-parsed fields (ISO 14496-3 §1.6.2.1): 5 bits
/// object type, 4 bits sampling-frequency-index, 4 bits channel config.
pub fn audio_specific_config(frame: &AdtsFrame) -> [u8; 2] {
    let sampling_index = SAMPLE_RATES
        .iter()
        .position(|&r| r == frame.sample_rate)
        .unwrap_or(4) as u8;
    let byte0 = (frame.profile << 3) | (sampling_index >> 1);
    let byte1 = (sampling_index << 7) | ((frame.channels as u8) << 3);
    [byte0, byte1]
}

/// Splits a PES payload of back-to-back ADTS frames into
/// `(header, raw_frame_bytes_without_header)` pairs.
pub fn split_adts_frames(data: &[u8]) -> Vec<(AdtsFrame, &[u8])> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        match parse_adts_header(&data[offset..]) {
            Some(frame) => {
                let header_len = if frame.frame_length >= 7 { 7 } else { 9 };
                let payload_end = offset + frame.frame_length;
                if payload_end > data.len() {
                    break;
                }
                frames.push((frame, &data[offset + header_len..payload_end]));
                offset = payload_end;
            }
            None => break,
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_adts_header(sample_rate_idx: u8, channel_config: u8, frame_length: usize) -> [u8; 7] {
        let mut h = [0u8; 7];
        h[0] = 0xFF;
        h[1] = 0xF1; // MPEG-4, no CRC
        h[2] = (1 << 6) | (sample_rate_idx << 2) | (channel_config >> 2);
        h[3] = ((channel_config & 0x03) << 6) | ((frame_length >> 11) as u8 & 0x03);
        h[4] = ((frame_length >> 3) & 0xFF) as u8;
        h[5] = (((frame_length & 0x07) << 5) as u8) | 0x1F;
        h[6] = 0xFC;
        h
    }

    #[test]
    fn parses_48khz_stereo_header() {
        let header = build_adts_header(3, 2, 100);
        let frame = parse_adts_header(&header).unwrap();
        assert_eq!(frame.sample_rate, 48000);
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.frame_length, 100);
    }

    #[test]
    fn rejects_bad_syncword() {
        let mut header = build_adts_header(3, 2, 100);
        header[0] = 0x00;
        assert!(parse_adts_header(&header).is_none());
    }

    #[test]
    fn audio_specific_config_round_trips_sample_rate_index() {
        let frame = AdtsFrame { profile: 2, sample_rate: 48000, channels: 2, frame_length: 100 };
        let asc = audio_specific_config(&frame);
        assert_eq!(asc[0] >> 3, 2);
        let sampling_index = ((asc[0] & 0x07) << 1) | (asc[1] >> 7);
        assert_eq!(sampling_index, 3);
    }

    #[test]
    fn splits_two_back_to_back_frames() {
        let mut data = Vec::new();
        data.extend_from_slice(&build_adts_header(3, 2, 7 + 4));
        data.extend_from_slice(&[1, 2, 3, 4]);
        data.extend_from_slice(&build_adts_header(3, 2, 7 + 2));
        data.extend_from_slice(&[5, 6]);
        let frames = split_adts_frames(&data);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].1, &[1, 2, 3, 4]);
        assert_eq!(frames[1].1, &[5, 6]);
    }
}
