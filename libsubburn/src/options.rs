use std::fmt::*;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::subtitle::SubtitleTrack;

#[derive(Debug, PartialEq, Eq, Clone, Copy, strum::EnumString, strum::EnumIter, strum::AsRefStr, strum::IntoStaticStr, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum VideoCodec {
    #[strum(serialize = "libx264")]
    X264,
    #[strum(serialize = "libx265")]
    X265,
    #[strum(serialize = "libvpx-vp9")]
    Vp9,
}

// Strum's Display renders the strum name; users should see the codec, not
// the encoder id, so this stays manual.
impl Display for VideoCodec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        use VideoCodec::*;
        fmt.write_str(match self {
            X264 => "H.264",
            X265 => "H.265",
            Vp9 => "VP9",
        })
    }
}

impl VideoCodec {
    /// The ffmpeg encoder id, as passed to `-c:v`.
    pub fn encoder_name(&self) -> &'static str {
        self.into()
    }

    /// Usable crf interval for this encoder.
    pub fn quality_range(&self) -> RangeInclusive<u32> {
        use VideoCodec::*;
        match self {
            X264 => 17..=28,
            X265 => 0..=51,
            Vp9 => 4..=63,
        }
    }

    pub fn default_quality(&self) -> u32 {
        use VideoCodec::*;
        match self {
            X264 => 23,
            X265 => 28,
            Vp9 => 10,
        }
    }

    /// vp9 has no -tune presets worth exposing.
    pub fn supports_tune(&self) -> bool {
        !matches!(self, VideoCodec::Vp9)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, strum::EnumString, strum::EnumIter, strum::AsRefStr, strum::IntoStaticStr, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum AudioCodec {
    Copy,
    AAC,
    #[strum(serialize = "libmp3lame")]
    MP3,
    #[strum(serialize = "libopus")]
    Opus,
}

impl Display for AudioCodec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        use AudioCodec::*;
        fmt.write_str(match self {
            Copy => "copy",
            AAC => "AAC",
            MP3 => "MP3",
            Opus => "Opus",
        })
    }
}

impl AudioCodec {
    pub fn encoder_name(&self) -> &'static str {
        self.into()
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, AudioCodec::Copy)
    }
}

/// What happens to the channel layout when audio is re-encoded.
#[derive(Debug, PartialEq, Eq, Clone, Copy, strum::EnumString, strum::EnumIter, strum::AsRefStr, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum AudioChannelMode {
    /// Keep whatever the source has.
    Passthrough,
    /// Downmix to two channels.
    Stereo,
    /// Downmix to two channels and pin the layout, for sources that
    /// advertise stereo through an exotic channel mask.
    #[strum(serialize = "forced-stereo")]
    ForcedStereo,
}

/// Source video facts the orchestrator trusts as-is. The caller resolves
/// them (see [crate::probe::probe_video]); the core never probes on its own.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub frame_rate: f64,
}

impl VideoInfo {
    pub fn total_frames(&self) -> u64 {
        (self.duration_seconds * self.frame_rate).round().max(0.0) as u64
    }
}

/// Round up to the next even dimension. Chroma-subsampled encoders reject
/// odd frame sizes.
pub fn even_dimension(v: u32) -> u32 {
    v + (v & 1)
}

/// Fully-resolved description of one burn-in job. Constructed once by the
/// caller, never mutated by the core.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub subtitles: SubtitleTrack,
    pub source: VideoInfo,
    pub target_width: u32,
    pub target_height: u32,
    pub video_codec: VideoCodec,
    pub preset: String,
    /// crf-style quality. Ignored in two-pass sizing mode.
    pub quality: Option<u32>,
    pub tune: Option<String>,
    pub audio_codec: AudioCodec,
    pub audio_sample_rate: u32,
    pub audio_channels: AudioChannelMode,
    pub audio_bitrate_kbps: u32,
    /// Some(..) selects two-pass sizing mode targeting this many MiB.
    pub target_size_mib: Option<f64>,
    /// Rewrite only the Default style's font size instead of resampling.
    /// Only honored when source and target geometry match.
    pub font_size: Option<f64>,
    pub output: PathBuf,
    /// Encoder binary; `ffmpeg` from PATH when empty.
    pub ffmpeg: Option<PathBuf>,
}

impl EncodeRequest {
    pub fn two_pass(&self) -> bool {
        self.target_size_mib.is_some()
    }

    pub fn resizes(&self) -> bool {
        even_dimension(self.target_width) != self.source.width
            || even_dimension(self.target_height) != self.source.height
    }

    pub fn ffmpeg_program(&self) -> PathBuf {
        self.ffmpeg.clone().unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn codec_names_round_trip() {
        assert_eq!(VideoCodec::X264.encoder_name(), "libx264");
        assert_eq!(VideoCodec::Vp9.encoder_name(), "libvpx-vp9");
        assert_eq!(VideoCodec::from_str("libx265").unwrap(), VideoCodec::X265);
        assert_eq!(AudioCodec::from_str("libmp3lame").unwrap(), AudioCodec::MP3);
        assert_eq!(AudioCodec::from_str("copy").unwrap(), AudioCodec::Copy);
    }

    #[test]
    fn quality_defaults_sit_inside_ranges() {
        for codec in [VideoCodec::X264, VideoCodec::X265, VideoCodec::Vp9] {
            assert!(codec.quality_range().contains(&codec.default_quality()));
        }
    }

    #[test]
    fn dimensions_always_even() {
        assert_eq!(even_dimension(1280), 1280);
        assert_eq!(even_dimension(1279), 1280);
        assert_eq!(even_dimension(1), 2);
    }

    #[test]
    fn total_frames_from_duration_and_rate() {
        let info = VideoInfo { width: 1920, height: 1080, duration_seconds: 300.0, frame_rate: 25.0 };
        assert_eq!(info.total_frames(), 7500);
    }
}
