//! subburn burns a styled subtitle track into a video file by driving an
//! external ffmpeg-compatible encoder through one or two passes, with live
//! frame-based progress, a remaining-time estimate, and cooperative
//! cancellation.
//!
//! The entry point is [encode::encode]; everything it needs arrives in a
//! fully-resolved [options::EncodeRequest]. The pure pieces (bitrate math,
//! argument construction, resampling, progress parsing) are usable on their
//! own.

pub mod bitrate;
pub mod codecs;
pub mod command;
pub mod encode;
pub mod error;
pub mod options;
pub mod pass;
pub mod probe;
pub mod progress;
pub mod resample;
pub mod subtitle;

pub use encode::{encode, EncodeResult, EncodeStatus, ProgressUpdate};
pub use error::EncodeError;
pub use options::{AudioChannelMode, AudioCodec, EncodeRequest, VideoCodec, VideoInfo};
