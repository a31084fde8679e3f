// Live input level metering
//
// An `AnalysisGraph` connects a media stream to an analyser: a feeder task
// copies captured frames into the analyser's sample window. The level loop
// reads the analyser once per refresh tick and publishes a value in [0, 1].

use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::analyser::{normalized_level, Analyser};
use super::backend::MediaStream;

/// Microphone source wired into an analyser
pub struct AnalysisGraph {
    analyser: Arc<Mutex<Analyser>>,
    feeder: JoinHandle<()>,
}

impl AnalysisGraph {
    pub fn connect(stream: &MediaStream, fft_size: usize) -> Result<Self> {
        let analyser = Arc::new(Mutex::new(Analyser::new(fft_size)?));
        let mut frames = stream.subscribe();
        let target = Arc::clone(&analyser);

        let feeder = tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => {
                        let samples = frame.mono_f32();
                        target
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push_samples(&samples);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Analyser skipped {} frames", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        info!("Analysis graph connected (fft size {})", fft_size);

        Ok(Self { analyser, feeder })
    }

    /// Non-owning reference for the level loop
    pub fn analyser(&self) -> Weak<Mutex<Analyser>> {
        Arc::downgrade(&self.analyser)
    }

    /// Disconnect the source and release the analyser
    pub fn close(self) {
        self.feeder.abort();
        info!("Analysis graph closed");
    }
}

/// Spawn the repeating level computation.
///
/// Ends when `token` is cancelled or the analyser has been released. A value
/// is only published while the token is live, so a reset written after
/// cancellation is never overwritten.
pub fn spawn_level_loop(
    analyser: Weak<Mutex<Analyser>>,
    level: Arc<watch::Sender<f32>>,
    token: CancellationToken,
    refresh: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut bins = Vec::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(analyser) = analyser.upgrade() else {
                break;
            };

            let value = {
                let mut analyser = analyser.lock().unwrap_or_else(PoisonError::into_inner);
                bins.resize(analyser.frequency_bin_count(), 0u8);
                analyser.byte_frequency_data(&mut bins);
                normalized_level(&bins)
            };

            level.send_if_modified(|current| {
                if token.is_cancelled() {
                    return false;
                }
                *current = value;
                true
            });
        }

        debug!("Level loop finished");
    })
}
