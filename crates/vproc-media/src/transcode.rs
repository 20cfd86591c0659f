//! Rendition transcoding.
//!
//! A transcode is started with [`Transcoder::transcode`] and observed through
//! a [`TranscodeHandle`]: a future that resolves exactly once, either when the
//! destination file has been fully written or with the encoder's failure.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use vproc_models::encoding::{EncodingConfig, DEFAULT_PRESET, RENDITION_HEIGHT};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Produces reduced-resolution renditions of local files.
pub trait Transcoder: Send + Sync {
    /// Start transcoding `source` into `destination`.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle abandons the transcode.
    fn transcode(&self, source: &Path, destination: &Path) -> TranscodeHandle;
}

/// Single-shot completion of a transcode.
#[derive(Debug)]
pub struct TranscodeHandle {
    rx: oneshot::Receiver<MediaResult<()>>,
}

/// Producer side of a [`TranscodeHandle`]; consumed by its one completion.
#[derive(Debug)]
pub struct TranscodeCompleter {
    tx: oneshot::Sender<MediaResult<()>>,
}

impl TranscodeHandle {
    /// Create a linked completer/handle pair.
    pub fn channel() -> (TranscodeCompleter, TranscodeHandle) {
        let (tx, rx) = oneshot::channel();
        (TranscodeCompleter { tx }, TranscodeHandle { rx })
    }

    /// A handle that is already resolved.
    pub fn ready(result: MediaResult<()>) -> Self {
        let (completer, handle) = Self::channel();
        completer.complete(result);
        handle
    }
}

impl TranscodeCompleter {
    /// Deliver the terminal outcome.
    pub fn complete(self, result: MediaResult<()>) {
        if self.tx.send(result).is_err() {
            debug!("Transcode outcome dropped: handle no longer awaited");
        }
    }

    /// Resolves once the handle has been dropped.
    pub async fn closed(&mut self) {
        self.tx.closed().await
    }
}

impl Future for TranscodeHandle {
    type Output = MediaResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(MediaError::internal(
                    "transcoder stopped without reporting an outcome",
                ))
            })
        })
    }
}

/// Transcoder configuration.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    /// FFmpeg executable
    pub ffmpeg_path: PathBuf,
    /// Kill the encoder after this many seconds (no limit when unset)
    pub timeout_secs: Option<u64>,
    /// Output encoding
    pub encoding: EncodingConfig,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout_secs: None,
            encoding: EncodingConfig::default(),
        }
    }
}

impl TranscoderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut encoding = EncodingConfig {
            height: std::env::var("TRANSCODE_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(RENDITION_HEIGHT),
            preset: std::env::var("TRANSCODE_PRESET").unwrap_or_else(|_| DEFAULT_PRESET.to_string()),
            ..Default::default()
        };
        if let Some(crf) = std::env::var("TRANSCODE_CRF").ok().and_then(|s| s.parse().ok()) {
            encoding = encoding.with_crf(crf);
        }
        if std::env::var("TRANSCODE_NVENC").map(|v| v == "true" || v == "1").unwrap_or(false) {
            encoding = encoding.with_nvenc();
        }

        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            encoding,
        }
    }
}

/// Transcoder backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        let mut runner = FfmpegRunner::new().with_program(config.ffmpeg_path);
        if let Some(secs) = config.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        Self {
            runner,
            encoding: config.encoding,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(TranscoderConfig::from_env())
    }

    /// Build the FFmpeg command for one rendition.
    pub fn command(&self, source: &Path, destination: &Path) -> FfmpegCommand {
        FfmpegCommand::new(source, destination)
            .video_filter(self.encoding.scale_filter())
            .output_args(self.encoding.to_ffmpeg_args())
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, source: &Path, destination: &Path) -> TranscodeHandle {
        let (mut completer, handle) = TranscodeHandle::channel();
        let cmd = self.command(source, destination);
        let runner = self.runner.clone();

        tokio::spawn(async move {
            tokio::select! {
                result = runner.run(&cmd) => {
                    match &result {
                        Ok(()) => info!("Transcoded {} to {}", cmd.input().display(), cmd.output().display()),
                        Err(e) => warn!("Transcode of {} failed: {}", cmd.input().display(), e),
                    }
                    completer.complete(result);
                }
                _ = completer.closed() => {
                    // Dropping the run future kills the encoder process.
                    warn!("Transcode of {} abandoned, stopping encoder", cmd.input().display());
                }
            }
        });

        handle
    }
}
