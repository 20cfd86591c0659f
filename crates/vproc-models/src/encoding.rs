//! Rendition encoding settings.

use serde::{Deserialize, Serialize};

/// Height of the published rendition in pixels.
pub const RENDITION_HEIGHT: u32 = 360;
pub const DEFAULT_PRESET: &str = "fast";
pub const DEFAULT_CRF: u8 = 23;

const SOFTWARE_CODEC: &str = "libx264";
const NVENC_CODEC: &str = "h264_nvenc";

/// How the single rendition is encoded.
///
/// Width is never configured: it follows the source aspect ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub height: u32,
    pub preset: String,
    /// Quality factor, lower is better
    pub crf: u8,
    pub audio_bitrate: String,
    /// Encode on the GPU
    pub use_nvenc: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            height: RENDITION_HEIGHT,
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_bitrate: "128k".to_string(),
            use_nvenc: false,
        }
    }
}

impl EncodingConfig {
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    pub fn with_nvenc(mut self) -> Self {
        self.use_nvenc = true;
        self
    }

    pub fn video_codec(&self) -> &'static str {
        if self.use_nvenc {
            NVENC_CODEC
        } else {
            SOFTWARE_CODEC
        }
    }

    /// Scale filter fixing the height and deriving an even width.
    ///
    /// `-2` keeps the aspect ratio and rounds to a multiple of 2, which
    /// yuv420p encoders require.
    pub fn scale_filter(&self) -> String {
        format!("scale=-2:{}", self.height)
    }

    /// Codec and quality arguments placed after the input.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        // NVENC takes a constant-quality target instead of a CRF
        let quality_flag = if self.use_nvenc { "-cq" } else { "-crf" };
        let crf = self.crf.to_string();
        [
            "-c:v",
            self.video_codec(),
            "-preset",
            self.preset.as_str(),
            quality_flag,
            crf.as_str(),
            "-c:a",
            "aac",
            "-b:a",
            self.audio_bitrate.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}
