use async_trait::async_trait;
use decommission_core::{AcknowledgmentError, LifecycleAcknowledger, LifecycleCompletion};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Records every completion instead of calling the autoscaling API.
#[derive(Default)]
pub struct RecordingAcknowledger {
    completions: Mutex<Vec<LifecycleCompletion>>,
    failing: AtomicBool,
}

impl RecordingAcknowledger {
    pub fn failing() -> Self {
        let ack = Self::default();
        ack.set_failing(true);
        ack
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn completions(&self) -> Vec<LifecycleCompletion> {
        match self.completions.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.completions().len()
    }
}

#[async_trait]
impl LifecycleAcknowledger for RecordingAcknowledger {
    async fn complete(&self, completion: &LifecycleCompletion) -> Result<(), AcknowledgmentError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AcknowledgmentError {
                hook: completion.lifecycle_hook_name.clone(),
                reason: "simulated autoscaling outage".to_string(),
            });
        }
        match self.completions.lock() {
            Ok(mut guard) => guard.push(completion.clone()),
            Err(poisoned) => poisoned.into_inner().push(completion.clone()),
        }
        Ok(())
    }
}
