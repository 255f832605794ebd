// ============================================================================
// QUANTIZE JOBS: cancellable, restartable one-shot background quantization
// ============================================================================
//
// Every spawn bumps a token and raises the previous job's cancel flag. Results
// carrying an older token are dropped on receipt, so a superseded job can never
// be merged into the current puzzle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ops::quantize::{quantize_bytes, QuantizeError, Quantized};

/// What the caller wants done with a finished quantization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPurpose {
    /// Start playing the puzzle immediately.
    Play,
    /// Store the puzzle in the gallery without playing it.
    Gallery,
}

/// Message sent back from a finished job.
#[derive(Debug)]
pub struct QuantizeResult {
    pub token: u64,
    pub purpose: JobPurpose,
    pub outcome: Result<Quantized, QuantizeError>,
}

pub struct QuantizeJobs {
    sender: mpsc::Sender<QuantizeResult>,
    receiver: mpsc::Receiver<QuantizeResult>,
    /// Token of the only job whose result will be accepted.
    current_token: u64,
    cancel_flag: Option<Arc<AtomicBool>>,
    /// True between `spawn` and receipt of the matching result.
    busy: bool,
}

impl Default for QuantizeJobs {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantizeJobs {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            current_token: 0,
            cancel_flag: None,
            busy: false,
        }
    }

    /// Start quantizing `bytes` on the rayon pool, superseding any job still
    /// in flight. Returns the new job's token.
    pub fn spawn(&mut self, bytes: Arc<[u8]>, grid_size: u32, color_count: usize, purpose: JobPurpose) -> u64 {
        self.cancel();

        let flag = Arc::new(AtomicBool::new(false));
        self.cancel_flag = Some(flag.clone());
        let token = self.current_token;
        self.busy = true;

        let sender = self.sender.clone();
        rayon::spawn(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                quantize_bytes(&bytes, grid_size, color_count, Some(&flag))
            }));
            let outcome = match outcome {
                Ok(result) => result,
                Err(panic_info) => {
                    let msg = panic_message(panic_info.as_ref());
                    crate::log_err!("Quantize job {} panicked: {}", token, msg);
                    Err(QuantizeError::Decode(msg))
                }
            };
            // Receiver may be gone after teardown; nothing to do then
            let _ = sender.send(QuantizeResult { token, purpose, outcome });
        });

        token
    }

    /// Raise the in-flight job's cancel flag and invalidate its token.
    pub fn cancel(&mut self) {
        if let Some(flag) = self.cancel_flag.take() {
            flag.store(true, Ordering::Relaxed);
        }
        self.current_token = self.current_token.wrapping_add(1);
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Non-blocking: return the current job's result if it has arrived.
    /// Stale results are drained and dropped.
    pub fn poll(&mut self) -> Option<QuantizeResult> {
        while let Ok(result) = self.receiver.try_recv() {
            if let Some(accepted) = self.accept(result) {
                return Some(accepted);
            }
        }
        None
    }

    /// Block up to `timeout` for the current job's result.
    pub fn wait(&mut self, timeout: Duration) -> Option<QuantizeResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(result) => {
                    if let Some(accepted) = self.accept(result) {
                        return Some(accepted);
                    }
                }
                Err(_) => return None,
            }
        }
    }

    fn accept(&mut self, result: QuantizeResult) -> Option<QuantizeResult> {
        if result.token != self.current_token || !self.busy {
            return None;
        }
        self.busy = false;
        self.cancel_flag = None;
        if matches!(result.outcome, Err(QuantizeError::Cancelled)) {
            return None;
        }
        Some(result)
    }
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
