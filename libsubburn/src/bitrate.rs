//! Target-bitrate math for two-pass size-constrained encoding.

use crate::error::EncodeError;

/// Below this the encoder cannot produce a usable stream; the job fails
/// before any process is spawned.
pub const MIN_VIDEO_KBPS: i64 = 10;

/// Video bitrate in kbps for a two-pass encode targeting `target_size_mib`.
///
/// `audio_reserved_mib` is the budget already claimed by stream-copied audio
/// (0 when audio is re-encoded). `reencoded_audio_kbps` is the audio bitrate
/// to subtract when audio is re-encoded with a known budget; the two
/// parameters are mutually exclusive branches of the same reservation.
///
/// 8192 converts MiB to kbit: 1 MiB = 8 * 1024 kbit.
pub fn two_pass_video_kbps(
    target_size_mib: f64,
    audio_reserved_mib: f64,
    duration_seconds: f64,
    reencoded_audio_kbps: Option<u32>,
) -> Result<u32, EncodeError> {
    let mut kbps = ((target_size_mib - audio_reserved_mib) * 8192.0 / duration_seconds).round() as i64;
    if let Some(audio) = reencoded_audio_kbps {
        kbps -= audio as i64;
    }
    if kbps < MIN_VIDEO_KBPS {
        return Err(EncodeError::BitrateTooLow(kbps));
    }
    Ok(kbps as u32)
}
