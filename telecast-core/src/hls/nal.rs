//! Annex-B NAL unit scanning for H.264/H.265 elementary streams: splitting a PES payload into NAL units and classifying keyframes.

/// Splits an Annex-B byte stream (`00 00 01` or `00 00 00 01` start codes)
/// into NAL unit slices, start code excluded.
pub fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }
    let mut units = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let mut end = starts.get(idx + 1).map(|&n| n - 3).unwrap_or(data.len());
        // a 4-byte start code's leading zero belongs to the next NAL's prefix, not this one.
        if end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            units.push(&data[start..end]);
        }
    }
    units
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H264NalType {
    NonIdrSlice,
    IdrSlice,
    Sei,
    Sps,
    Pps,
    Aud,
    Other,
}

pub fn classify_h264_nal(nal: &[u8]) -> H264NalType {
    let Some(&header) = nal.first() else { return H264NalType::Other };
    match header & 0x1F {
        1 => H264NalType::NonIdrSlice,
        5 => H264NalType::IdrSlice,
        6 => H264NalType::Sei,
        7 => H264NalType::Sps,
        8 => H264NalType::Pps,
        9 => H264NalType::Aud,
        _ => H264NalType::Other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H265NalType {
    Vcl,
    Idr,
    Vps,
    Sps,
    Pps,
    Aud,
    Sei,
    Other,
}

pub fn classify_h265_nal(nal: &[u8]) -> H265NalType {
    let Some(&header) = nal.first() else { return H265NalType::Other };
    let nal_unit_type = (header >> 1) & 0x3F;
    match nal_unit_type {
        19 | 20 | 21 => H265NalType::Idr,
        0..=9 | 16..=18 => H265NalType::Vcl,
        32 => H265NalType::Vps,
        33 => H265NalType::Sps,
        34 => H265NalType::Pps,
        35 => H265NalType::Aud,
        39 => H265NalType::Sei,
        _ => H265NalType::Other,
    }
}

/// `true` if any NAL in `data` is a video-coded slice belonging to an IDR
/// access unit (the Writer's GOP/keyframe boundary,).
pub fn contains_idr(data: &[u8], is_hevc: bool) -> bool {
    split_nal_units(data).into_iter().any(|nal| {
        if is_hevc {
            classify_h265_nal(nal) == H265NalType::Idr
        } else {
            classify_h264_nal(nal) == H264NalType::IdrSlice
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_three_byte_start_codes() {
        let data = [0, 0, 1, 0x67, 0xAA, 0, 0, 1, 0x68, 0xBB];
        let units = split_nal_units(&data);
        assert_eq!(units, vec![&[0x67u8, 0xAA][..], &[0x68u8, 0xBB][..]]);
    }

    #[test]
    fn classifies_h264_idr_and_sps() {
        assert_eq!(classify_h264_nal(&[0x65]), H264NalType::IdrSlice);
        assert_eq!(classify_h264_nal(&[0x67]), H264NalType::Sps);
    }

    #[test]
    fn classifies_h265_idr_and_vps() {
        // nal_unit_type is bits 1-6 of the first byte: IDR_W_RADL = 19 -> 0b010011 << 1 = 0x26
        assert_eq!(classify_h265_nal(&[0x26, 0x01]), H265NalType::Idr);
        assert_eq!(classify_h265_nal(&[0x40, 0x01]), H265NalType::Vps);
    }

    #[test]
    fn contains_idr_detects_h264_keyframe_access_unit() {
        let data = [0, 0, 1, 0x09, 0xF0, 0, 0, 1, 0x65, 0xAA, 0xBB];
        assert!(contains_idr(&data, false));
    }

    #[test]
    fn contains_idr_is_false_for_non_idr_slice() {
        let data = [0, 0, 1, 0x41, 0xAA];
        assert!(!contains_idr(&data, false));
    }
}
