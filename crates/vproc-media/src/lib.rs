//! FFmpeg CLI wrapper for rendition transcoding.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner with stderr capture, timeouts and kill-on-drop
//! - The `Transcoder` capability and its single-shot `TranscodeHandle`

pub mod command;
pub mod error;
pub mod transcode;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use transcode::{
    FfmpegTranscoder, TranscodeCompleter, TranscodeHandle, Transcoder, TranscoderConfig,
};
