pub mod analyser;
pub mod backend;
pub mod capture;
pub mod file;
pub mod meter;
pub mod playback;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use analyser::{normalized_level, Analyser, DEFAULT_FFT_SIZE};
pub use backend::{AudioFrame, CaptureConfig, LocalAudioTrack, MediaDevices, MediaStream, TrackState};
pub use capture::{open_capture_thread, CaptureFormat};
pub use file::{AudioFile, WavFileDevice};
pub use meter::{spawn_level_loop, AnalysisGraph};
pub use playback::{AudioOutput, DiscardOutput, Playback};

#[cfg(feature = "microphone")]
pub use microphone::CpalMicrophone;
