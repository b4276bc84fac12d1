//! FFmpeg CLI wrapper for short-form video assembly.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a subprocess runner
//! - Voiceover duration fitting with chained `atempo` stages
//! - Karaoke-style ASS caption compilation
//! - Background catalog selection and ingest
//! - Video composition with VAAPI and software fallback

pub mod captions;
pub mod catalog;
pub mod command;
pub mod compositor;
pub mod error;
pub mod hwaccel;
pub mod ingest;
pub mod probe;
pub mod tempo;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use captions::{CaptionCompiler, CaptionStyle};
pub use catalog::{BackgroundCatalog, CatalogEntry};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegBackend, FfmpegCommand, FfmpegRunner};
pub use compositor::{CompositionOutput, CompositionRequest, EncodePath, VideoCompositor};
pub use error::{MediaError, MediaResult};
pub use hwaccel::{HardwareCapability, DEFAULT_VAAPI_DEVICE};
pub use ingest::{download_source, CatalogIngest};
pub use probe::probe_duration;
pub use tempo::{DurationFitter, FittedAudio};
