// Capture devices whose handles must stay on the thread that opened them
//
// The opener runs on a dedicated thread and its handle lives there until the
// track stops. An acquisition that is abandoned before the stream is handed
// over stops the track, so the thread never parks on a stream nobody holds.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};

use super::backend::{AudioFrame, LocalAudioTrack, MediaStream};

/// What an opener reports once its device is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Stops the track unless the acquisition completed
struct AcquireGuard {
    track: Option<Arc<LocalAudioTrack>>,
}

impl AcquireGuard {
    fn new(track: Arc<LocalAudioTrack>) -> Self {
        Self { track: Some(track) }
    }

    fn disarm(mut self) {
        self.track = None;
    }
}

impl Drop for AcquireGuard {
    fn drop(&mut self) {
        if let Some(track) = self.track.take() {
            debug!("Capture acquisition abandoned, stopping track {}", track.id());
            track.stop();
        }
    }
}

/// Open a device on its own thread and wrap it in a one-track stream.
///
/// `open` receives the stream's frame sender and returns the handle that keeps
/// the device running. The handle is dropped on that thread once the track
/// stops, or straight away if the caller gave up before the stream was ready.
pub async fn open_capture_thread<F, H>(thread_name: &str, open: F) -> Result<MediaStream>
where
    F: FnOnce(broadcast::Sender<AudioFrame>) -> Result<(H, CaptureFormat)> + Send + 'static,
    H: 'static,
{
    let track = Arc::new(LocalAudioTrack::new());
    let mut stream = MediaStream::new();
    stream.add_track(Arc::clone(&track));

    let sender = stream.frame_sender();
    let stopped = track.stopped();
    let (ready_tx, ready_rx) = oneshot::channel::<Result<CaptureFormat>>();
    let guard = AcquireGuard::new(Arc::clone(&track));
    let name = thread_name.to_string();

    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let (handle, format) = match open(sender) {
                Ok(opened) => opened,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if ready_tx.send(Ok(format)).is_err() {
                drop(handle);
                debug!("{}: nobody waiting for the device, closed it", name);
                return;
            }

            futures::executor::block_on(stopped.cancelled());
            drop(handle);
            info!("{}: capture stopped", name);
        })
        .with_context(|| format!("Failed to spawn {} thread", thread_name))?;

    let format = ready_rx
        .await
        .map_err(|_| anyhow!("{} thread exited before reporting", thread_name))??;
    guard.disarm();

    info!(
        "Capture device ready ({}Hz, {} channels)",
        format.sample_rate, format.channels
    );

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TrackState;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Handle(Arc<AtomicBool>);

    impl Drop for Handle {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    async fn wait_for(flag: &AtomicBool) -> bool {
        for _ in 0..200 {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    fn format() -> CaptureFormat {
        CaptureFormat {
            sample_rate: 48000,
            channels: 1,
        }
    }

    #[tokio::test]
    async fn test_handle_lives_until_track_stops() {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);

        let stream = open_capture_thread("test-capture", move |_| Ok((Handle(flag), format())))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closed.load(Ordering::SeqCst));

        stream.stop_all();
        assert!(wait_for(&closed).await);
    }

    #[tokio::test]
    async fn test_open_error_is_returned() {
        let result = open_capture_thread::<_, ()>("test-capture", |_| Err(anyhow!("no device"))).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("no device"));
    }

    #[tokio::test]
    async fn test_abandoned_acquisition_closes_device() {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let acquisition = tokio::spawn(open_capture_thread("test-capture", move |_| {
            let _ = release_rx.recv();
            Ok((Handle(flag), format()))
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        acquisition.abort();
        let _ = acquisition.await;

        // The device finishes opening after the caller is gone
        release_tx.send(()).unwrap();
        assert!(wait_for(&closed).await);
    }

    #[tokio::test]
    async fn test_guard_stops_track_when_dropped() {
        let track = Arc::new(LocalAudioTrack::new());
        drop(AcquireGuard::new(Arc::clone(&track)));
        assert_eq!(track.state(), TrackState::Ended);

        let track = Arc::new(LocalAudioTrack::new());
        AcquireGuard::new(Arc::clone(&track)).disarm();
        assert_eq!(track.state(), TrackState::Live);
    }
}
