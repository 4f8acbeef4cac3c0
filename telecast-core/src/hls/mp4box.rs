//! Minimal ISO-BMFF/CMAF box builder for the LL-HLS segmenter: plain
//! "big-endian length + fourcc + payload" helpers covering the
//! avc1/hvc1 + mp4a two-track, `moof`-per-track layout this segmenter
//! produces.

/// Wraps `payload` in a standard (non-full) box: `size(4) + fourcc(4) +
/// payload`.
pub fn make_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(payload);
    out
}

/// Wraps the concatenation of `children` in a box.
pub fn make_container_box(fourcc: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = children.iter().flat_map(|c| c.iter().copied()).collect();
    make_box(fourcc, &payload)
}

/// A "full box": version(1) + flags(3) + payload.
fn make_full_box(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + payload.len());
    body.push(version);
    body.extend_from_slice(&flags.to_be_bytes()[1..]);
    body.extend_from_slice(payload);
    make_box(fourcc, &body)
}

pub fn ftyp() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"iso5"); // major_brand
    payload.extend_from_slice(&512u32.to_be_bytes()); // minor_version
    payload.extend_from_slice(b"iso5");
    payload.extend_from_slice(b"dash");
    make_box(b"ftyp", &payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Avc,
    Hevc,
}

#[derive(Debug, Clone)]
pub struct VideoTrackInfo {
    pub track_id: u32,
    pub codec: VideoCodec,
    pub width: u16,
    pub height: u16,
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
    /// HEVC only.
    pub vps: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AudioTrackInfo {
    pub track_id: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// The ADTS `AudioSpecificConfig` (2 bytes for plain AAC-LC), needed
    /// verbatim inside the `esds` box.
    pub audio_specific_config: Vec<u8>,
}

/// `moov` with one `mvhd`, two `trak`s (video, audio), and an `mvex` that
/// makes every subsequent fragment independently decodable: the init
/// segment layout is `ftyp + moov(mvhd, mvex(trex(1), trex(2)),
/// [avc1|hvc1, mp4a])`.
pub fn moov(video: &VideoTrackInfo, audio: &AudioTrackInfo, movie_timescale: u32) -> Vec<u8> {
    let mvhd = mvhd(movie_timescale);
    let video_trak = video_trak(video);
    let audio_trak = audio_trak(audio);
    let mvex = make_container_box(b"mvex", &[trex(video.track_id), trex(audio.track_id)]);
    make_container_box(b"moov", &[mvhd, video_trak, audio_trak, mvex])
}

fn mvhd(timescale: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 4 + 4 + 4 + 4];
    payload[8..12].copy_from_slice(&timescale.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes()); // duration unknown (fragmented)
    payload.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
    payload.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
    payload.extend_from_slice(&[0u8; 2]); // reserved
    payload.extend_from_slice(&[0u8; 8]); // reserved
    payload.extend_from_slice(&identity_matrix());
    payload.extend_from_slice(&[0u8; 24]); // pre_defined
    payload.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // next_track_ID unused placeholder
    make_full_box(b"mvhd", 0, 0, &payload)
}

fn identity_matrix() -> [u8; 36] {
    let mut m = [0u8; 36];
    m[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    m[16..20].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    m[32..36].copy_from_slice(&0x4000_0000u32.to_be_bytes());
    m
}

fn trex(track_id: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&track_id.to_be_bytes());
    payload.extend_from_slice(&1u32.to_be_bytes()); // default_sample_description_index
    payload.extend_from_slice(&0u32.to_be_bytes()); // default_sample_duration
    payload.extend_from_slice(&0u32.to_be_bytes()); // default_sample_size
    payload.extend_from_slice(&0u32.to_be_bytes()); // default_sample_flags
    make_full_box(b"trex", 0, 0, &payload)
}

fn tkhd(track_id: u32, width: u16, height: u16) -> Vec<u8> {
    let mut payload = vec![0u8; 4 + 4]; // creation/modification time
    payload.extend_from_slice(&track_id.to_be_bytes());
    payload.extend_from_slice(&[0u8; 4]); // reserved
    payload.extend_from_slice(&[0u8; 4]); // duration
    payload.extend_from_slice(&[0u8; 8]); // reserved
    payload.extend_from_slice(&[0u8; 2]); // layer
    payload.extend_from_slice(&[0u8; 2]); // alternate_group
    payload.extend_from_slice(&0u16.to_be_bytes()); // volume (0 for video)
    payload.extend_from_slice(&[0u8; 2]); // reserved
    payload.extend_from_slice(&identity_matrix());
    payload.extend_from_slice(&((width as u32) << 16).to_be_bytes());
    payload.extend_from_slice(&((height as u32) << 16).to_be_bytes());
    make_full_box(b"tkhd", 0, 0x000007, &payload)
}

fn mdhd(timescale: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 8]; // creation/modification time
    payload.extend_from_slice(&timescale.to_be_bytes());
    payload.extend_from_slice(&[0u8; 4]); // duration
    payload.extend_from_slice(&0x55c4u16.to_be_bytes()); // language "und"
    payload.extend_from_slice(&[0u8; 2]);
    make_full_box(b"mdhd", 0, 0, &payload)
}

fn hdlr(is_video: bool) -> Vec<u8> {
    let mut payload = vec![0u8; 4]; // pre_defined
    payload.extend_from_slice(if is_video { b"vide" } else { b"soun" });
    payload.extend_from_slice(&[0u8; 12]); // reserved
    let name: &[u8] = if is_video { b"video\0" } else { b"sound\0" };
    payload.extend_from_slice(name);
    make_full_box(b"hdlr", 0, 0, &payload)
}

fn avcc(video: &VideoTrackInfo) -> Vec<u8> {
    let mut payload = vec![1u8]; // configurationVersion
    payload.push(video.sps.get(1).copied().unwrap_or(0)); // profile
    payload.push(video.sps.get(2).copied().unwrap_or(0)); // compat
    payload.push(video.sps.get(3).copied().unwrap_or(0)); // level
    payload.push(0xFF); // reserved(6)+lengthSizeMinusOne=3 (4-byte lengths)
    payload.push(0xE1); // reserved(3)+numOfSPS=1
    payload.extend_from_slice(&(video.sps.len() as u16).to_be_bytes());
    payload.extend_from_slice(&video.sps);
    payload.push(1); // numOfPPS
    payload.extend_from_slice(&(video.pps.len() as u16).to_be_bytes());
    payload.extend_from_slice(&video.pps);
    make_box(b"avcC", &payload)
}

fn hvcc(video: &VideoTrackInfo) -> Vec<u8> {
    // Simplified HEVCDecoderConfigurationRecord: enough fields for players
    // to locate VPS/SPS/PPS; profile/tier/level bytes left at 0 since this
    // system copies them from the live ARIB broadcast, not a fixed ladder.
    let mut payload = vec![1u8]; // configurationVersion
    payload.extend_from_slice(&[0u8; 12]); // profile/compat/constraint flags
    payload.push(0); // general_level_idc
    payload.extend_from_slice(&[0xF0, 0x00]); // min_spatial_segmentation_idc
    payload.push(0xFC); // parallelismType
    payload.push(0xFC); // chroma_format
    payload.push(0xF8); // bit_depth_luma
    payload.push(0xF8); // bit_depth_chroma
    payload.extend_from_slice(&[0u8; 2]); // avgFrameRate
    payload.push(0x0F); // constantFrameRate/numTemporalLayers/lengthSizeMinusOne=3
    payload.push(3); // numOfArrays

    for (nal_type, unit) in [(32u8, &video.vps), (33u8, &video.sps), (34u8, &video.pps)] {
        payload.push(0x80 | nal_type); // array_completeness + NAL_unit_type
        payload.extend_from_slice(&1u16.to_be_bytes()); // numNalus
        payload.extend_from_slice(&(unit.len() as u16).to_be_bytes());
        payload.extend_from_slice(unit);
    }
    make_box(b"hvcC", &payload)
}

fn video_sample_entry(video: &VideoTrackInfo) -> Vec<u8> {
    let mut payload = vec![0u8; 6]; // reserved
    payload.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    payload.extend_from_slice(&[0u8; 16]); // pre_defined + reserved
    payload.extend_from_slice(&video.width.to_be_bytes());
    payload.extend_from_slice(&video.height.to_be_bytes());
    payload.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // horizresolution 72dpi
    payload.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // vertresolution
    payload.extend_from_slice(&[0u8; 4]); // reserved
    payload.extend_from_slice(&1u16.to_be_bytes()); // frame_count
    payload.extend_from_slice(&[0u8; 32]); // compressorname
    payload.extend_from_slice(&0x0018u16.to_be_bytes()); // depth 24
    payload.extend_from_slice(&0xFFFFu16.to_be_bytes()); // pre_defined

    let config_box = match video.codec {
        VideoCodec::Avc => avcc(video),
        VideoCodec::Hevc => hvcc(video),
    };
    payload.extend_from_slice(&config_box);

    let fourcc = match video.codec {
        VideoCodec::Avc => *b"avc1",
        VideoCodec::Hevc => *b"hvc1",
    };
    make_box(&fourcc, &payload)
}

fn esds(audio: &AudioTrackInfo) -> Vec<u8> {
    // DecoderSpecificInfo tag (0x05) carries the raw AudioSpecificConfig;
    // the surrounding ES_Descriptor/DecoderConfigDescriptor framing is the
    // minimum MP4 players require to locate it.
    let mut dsi = vec![0x05, audio.audio_specific_config.len() as u8];
    dsi.extend_from_slice(&audio.audio_specific_config);

    let mut dec_config = vec![0x04, (13 + dsi.len()) as u8];
    dec_config.push(0x40); // objectTypeIndication: MPEG-4 Audio
    dec_config.push(0x15); // streamType: audio, upStream=0, reserved=1
    dec_config.extend_from_slice(&[0, 0, 0]); // bufferSizeDB
    dec_config.extend_from_slice(&0u32.to_be_bytes()); // maxBitrate
    dec_config.extend_from_slice(&0u32.to_be_bytes()); // avgBitrate
    dec_config.extend_from_slice(&dsi);

    let mut es = vec![0x03, (3 + dec_config.len() + 3) as u8];
    es.extend_from_slice(&0u16.to_be_bytes()); // ES_ID
    es.push(0); // flags
    es.extend_from_slice(&dec_config);
    es.extend_from_slice(&[0x06, 0x01, 0x02]); // SLConfigDescriptor, predefined=2

    make_full_box(b"esds", 0, 0, &es)
}

fn audio_sample_entry(audio: &AudioTrackInfo) -> Vec<u8> {
    let mut payload = vec![0u8; 6]; // reserved
    payload.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
    payload.extend_from_slice(&[0u8; 8]); // reserved
    payload.extend_from_slice(&audio.channels.to_be_bytes());
    payload.extend_from_slice(&0x0010u16.to_be_bytes()); // samplesize 16
    payload.extend_from_slice(&[0u8; 4]); // pre_defined + reserved
    payload.extend_from_slice(&((audio.sample_rate as u32) << 16).to_be_bytes());
    payload.extend_from_slice(&esds(audio));
    make_box(b"mp4a", &payload)
}

fn stsd_for(sample_entry: Vec<u8>) -> Vec<u8> {
    let mut payload = vec![0u8; 4]; // version/flags
    payload.extend_from_slice(&1u32.to_be_bytes()); // entry_count
    payload.extend_from_slice(&sample_entry);
    make_box(b"stsd", &payload)
}

fn empty_table_box(fourcc: &[u8; 4]) -> Vec<u8> {
    let mut payload = vec![0u8; 4]; // version/flags
    payload.extend_from_slice(&0u32.to_be_bytes()); // entry_count 0
    make_box(fourcc, &payload)
}

fn stbl(sample_entry: Vec<u8>) -> Vec<u8> {
    make_container_box(
        b"stbl",
        &[
            stsd_for(sample_entry),
            empty_table_box(b"stts"),
            empty_table_box(b"stsc"),
            empty_table_box(b"stsz"),
            empty_table_box(b"stco"),
        ],
    )
}

fn minf(is_video: bool, sample_entry: Vec<u8>) -> Vec<u8> {
    let media_header = if is_video {
        make_full_box(b"vmhd", 0, 1, &[0u8; 8])
    } else {
        make_full_box(b"smhd", 0, 0, &[0u8; 4])
    };
    let dinf = make_container_box(
        b"dinf",
        &[make_container_box(b"dref", &[make_full_box(b"url ", 0, 1, &[])])],
    );
    make_container_box(b"minf", &[media_header, dinf, stbl(sample_entry)])
}

fn mdia(is_video: bool, timescale: u32, sample_entry: Vec<u8>) -> Vec<u8> {
    make_container_box(b"mdia", &[mdhd(timescale), hdlr(is_video), minf(is_video, sample_entry)])
}

fn video_trak(video: &VideoTrackInfo) -> Vec<u8> {
    let tkhd = tkhd(video.track_id, video.width, video.height);
    let mdia = mdia(true, 90_000, video_sample_entry(video));
    make_container_box(b"trak", &[tkhd, mdia])
}

fn audio_trak(audio: &AudioTrackInfo) -> Vec<u8> {
    let tkhd = tkhd(audio.track_id, 0, 0);
    let mdia = mdia(false, audio.sample_rate, audio_sample_entry(audio));
    make_container_box(b"trak", &[tkhd, mdia])
}

#[derive(Debug, Clone, Copy)]
pub struct FragmentSample {
    pub duration: u32,
    pub size: u32,
    pub is_sync: bool,
    pub composition_time_offset: i32,
}

/// Builds one track's `moof` + `mdat` pair for one GOP/AAC-frame-run.
/// Kept single-track per pair, matching the simplest correct trun
/// `data_offset` computation (the example this is grounded on uses the
/// same one-track-per-fragment layout).
pub fn moof_and_mdat(
    sequence_number: u32,
    track_id: u32,
    base_media_decode_time: u64,
    samples: &[FragmentSample],
    payload: &[u8],
) -> (Vec<u8>, Vec<u8>) {
    let mfhd = make_full_box(b"mfhd", 0, 0, &sequence_number.to_be_bytes());

    let tfhd_payload = track_id.to_be_bytes();
    let tfhd = make_full_box(b"tfhd", 0, 0x02_0000, &tfhd_payload); // default-base-is-moof

    let tfdt = make_full_box(b"tfdt", 1, 0, &base_media_decode_time.to_be_bytes());

    // trun flags: data-offset-present, sample-duration/size/flags/CTO present.
    let trun_flags: u32 = 0x00_0001 | 0x00_0100 | 0x00_0200 | 0x00_0400 | 0x00_0800;
    let mut trun_payload = Vec::new();
    trun_payload.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    // data_offset placeholder, patched below once moof's size is known.
    trun_payload.extend_from_slice(&0i32.to_be_bytes());
    for s in samples {
        trun_payload.extend_from_slice(&s.duration.to_be_bytes());
        trun_payload.extend_from_slice(&s.size.to_be_bytes());
        let flags = sample_flags(s.is_sync);
        trun_payload.extend_from_slice(&flags);
        trun_payload.extend_from_slice(&s.composition_time_offset.to_be_bytes());
    }
    let trun = make_full_box(b"trun", 0, trun_flags, &trun_payload);

    let traf = make_container_box(b"traf", &[tfhd, tfdt, trun]);
    let mut moof = make_container_box(b"moof", &[mfhd, traf]);

    // data_offset is measured from the start of the moof box to the first
    // byte of sample data inside the following mdat (moof.len() + 8 for
    // mdat's own box header). tfhd/tfdt are both fixed-size boxes (16 and
    // 20 bytes respectively) so the data_offset field always lands at a
    // constant position: moof(8) + mfhd(16) + traf(8) + tfhd(16) +
    // tfdt(20) + trun header+version/flags(12) + sample_count(4) = 84.
    const DATA_OFFSET_FIELD_POS: usize = 84;
    debug_assert_eq!(
        u32::from_be_bytes(moof[DATA_OFFSET_FIELD_POS - 4..DATA_OFFSET_FIELD_POS].try_into().unwrap()),
        samples.len() as u32
    );
    let data_offset = (moof.len() as i32) + 8;
    moof[DATA_OFFSET_FIELD_POS..DATA_OFFSET_FIELD_POS + 4].copy_from_slice(&data_offset.to_be_bytes());

    let mdat = make_box(b"mdat", payload);
    (moof, mdat)
}

fn sample_flags(is_sync: bool) -> [u8; 4] {
    // is_leading=0, sample_depends_on=2 (no other sample depends on it is
    // unknown so leave depends_on at "unknown"=0 for non-sync and 2 for
    // sync), sample_is_non_sync_sample is the bit players actually key
    // keyframe detection off.
    let depends_on: u8 = if is_sync { 2 } else { 1 };
    let is_non_sync: u8 = if is_sync { 0 } else { 1 };
    [0, depends_on << 4, is_non_sync, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_box_encodes_length_and_fourcc() {
        let b = make_box(b"test", &[1, 2, 3]);
        assert_eq!(&b[4..8], b"test");
        assert_eq!(u32::from_be_bytes(b[0..4].try_into().unwrap()), 11);
    }

    #[test]
    fn ftyp_starts_with_major_brand() {
        let b = ftyp();
        assert_eq!(&b[8..12], b"iso5");
    }

    #[test]
    fn moov_contains_mvhd_and_both_traks() {
        let video = VideoTrackInfo {
            track_id: 1,
            codec: VideoCodec::Avc,
            width: 1920,
            height: 1080,
            sps: vec![0x67, 0x64, 0x00, 0x28],
            pps: vec![0x68, 0xEB],
            vps: Vec::new(),
        };
        let audio = AudioTrackInfo {
            track_id: 2,
            sample_rate: 48000,
            channels: 2,
            audio_specific_config: vec![0x11, 0x90],
        };
        let b = moov(&video, &audio, 90_000);
        assert_eq!(&b[4..8], b"moov");
        let body = &b[8..];
        assert!(contains_fourcc(body, b"mvhd"));
        assert!(contains_fourcc(body, b"trak"));
        assert!(contains_fourcc(body, b"mvex"));
    }

    #[test]
    fn moof_and_mdat_round_trip_box_sizes() {
        let samples = vec![FragmentSample { duration: 3000, size: 4, is_sync: true, composition_time_offset: 0 }];
        let (moof, mdat) = moof_and_mdat(0, 1, 0, &samples, &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&moof[4..8], b"moof");
        assert_eq!(&mdat[4..8], b"mdat");
        assert_eq!(u32::from_be_bytes(mdat[0..4].try_into().unwrap()) as usize, mdat.len());
    }

    fn contains_fourcc(buf: &[u8], fourcc: &[u8; 4]) -> bool {
        buf.windows(4).any(|w| w == fourcc)
    }
}
