use tokio::sync::broadcast;
use tracing::debug;

pub const DEFAULT_PROGRESS_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubjectTag {
    TrackedDownload,
    TrackedFlash,
    SelfDownload,
    ModuleDownload,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSample {
    pub fraction: f32,
    pub subject: SubjectTag,
}

impl ProgressSample {
    pub fn new(fraction: f32, subject: SubjectTag) -> Self {
        Self { fraction, subject }
    }

    /// Whole percent, rounded to nearest. Out-of-range fractions are clamped.
    pub fn percent(&self) -> u8 {
        let fraction = if self.fraction.is_nan() {
            0.0
        } else {
            self.fraction.clamp(0.0, 1.0)
        };
        (fraction * 100.0).round() as u8
    }
}

/// Multicast progress feed. Each subscriber sees samples in the order they
/// were reported.
#[derive(Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<ProgressSample>,
}

impl ProgressChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter {
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        ProgressSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_CAPACITY)
    }
}

/// Producer handle given to downloaders.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressSample>,
}

impl ProgressReporter {
    pub fn report(&self, fraction: f32, subject: SubjectTag) {
        // No subscribers is fine; nobody is watching.
        let _ = self.sender.send(ProgressSample::new(fraction, subject));
    }
}

/// One observer's view of a [`ProgressChannel`]. Dropping it unsubscribes.
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressSample>,
}

impl ProgressSubscription {
    /// Next sample, or `None` once every reporter and the channel are gone.
    /// Samples missed by a lagging subscriber are skipped.
    pub async fn recv(&mut self) -> Option<ProgressSample> {
        loop {
            match self.receiver.recv().await {
                Ok(sample) => return Some(sample),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("progress subscriber lagged, skipped {skipped} samples");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
