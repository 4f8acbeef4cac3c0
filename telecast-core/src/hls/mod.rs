//! LL-HLS segmenter: NAL/ADTS parsing, a hand-built
//! ISO-BMFF box writer, the playlist/blocking-request primitive, and the
//! demux/fragment state machine that ties them together.

mod adts;
mod mp4box;
mod nal;
mod playlist;
mod segmenter;

pub use adts::{audio_specific_config, parse_adts_header, split_adts_frames, AdtsFrame};
pub use mp4box::{moof_and_mdat, moov, ftyp, AudioTrackInfo, FragmentSample, VideoCodec, VideoTrackInfo};
pub use nal::{classify_h264_nal, classify_h265_nal, contains_idr, split_nal_units, H264NalType, H265NalType};
pub use playlist::{Partial, Playlist, Segment, SharedPlaylist, PARTIAL_TARGET_DURATION, TARGET_WINDOW_SEGMENTS};
pub use segmenter::{
    audio_access_units, program_date_time, video_access_units, DemuxedUnit, InitAccumulator,
    TrackSegmenter, TsDemuxer, VideoCodecKind, VideoFeedResult,
};
