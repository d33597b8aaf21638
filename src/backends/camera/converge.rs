// SPDX-License-Identifier: GPL-3.0-only

//! Auto-focus / auto-exposure convergence waiter
//!
//! ```text
//! Idle -> TriggerSent -> Polling -> Converged | TimedOut
//! ```
//!
//! The waiter re-issues the repeating preview request, submits one capture
//! carrying the trigger, and polls the merged result streams. The first
//! result whose state is unreported or in the ready set wins; both streams
//! are dropped right after. A fixed deadline races the wait and a timeout is
//! a degraded success, never an error.

use super::CameraService;
use super::metadata::{MetadataKey, ae_precapture_trigger, ae_state, af_state, af_trigger};
use super::types::*;
use crate::errors::{CameraError, CameraResult};
use futures::StreamExt;
use futures::stream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a convergence wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// A result reported a ready state, or did not report the key at all
    Converged {
        state: Option<i32>,
        frame_number: u64,
    },
    /// The deadline passed first
    TimedOut { last_state: Option<i32> },
    /// Both result streams ended without a ready result
    StreamEnded { last_state: Option<i32> },
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    TriggerSent,
    Polling,
}

/// Trigger-then-poll waiter for one 3A routine
#[derive(Clone)]
pub struct ConvergenceWaiter {
    service: Arc<dyn CameraService>,
    name: &'static str,
    trigger_key: MetadataKey,
    trigger_value: i32,
    state_key: MetadataKey,
    ready: &'static [i32],
    timeout: Duration,
}

impl ConvergenceWaiter {
    pub fn new(
        service: Arc<dyn CameraService>,
        name: &'static str,
        trigger: (MetadataKey, i32),
        state_key: MetadataKey,
        ready: &'static [i32],
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            name,
            trigger_key: trigger.0,
            trigger_value: trigger.1,
            state_key,
            ready,
            timeout,
        }
    }

    /// Waiter for the auto-focus sweep
    pub fn auto_focus(service: Arc<dyn CameraService>, timeout: Duration) -> Self {
        Self::new(
            service,
            "auto-focus",
            (MetadataKey::AfTrigger, af_trigger::START),
            MetadataKey::AfState,
            af_state::READY,
            timeout,
        )
    }

    /// Waiter for the auto-exposure precapture sequence
    pub fn auto_exposure(service: Arc<dyn CameraService>, timeout: Duration) -> Self {
        Self::new(
            service,
            "auto-exposure",
            (MetadataKey::AePrecaptureTrigger, ae_precapture_trigger::START),
            MetadataKey::AeState,
            ae_state::READY,
            timeout,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_ready(&self, state: Option<i32>) -> bool {
        state.is_none_or(|s| self.ready.contains(&s))
    }

    /// Trigger the routine on `session` and wait for it to settle
    ///
    /// `preview` is the session's repeating request; it is re-issued so the
    /// repeating stream is fresh for this wait.
    pub async fn wait_for_converge(
        &self,
        session: &SessionHandle,
        preview: &CaptureRequest,
    ) -> CameraResult<Convergence> {
        let mut phase = Phase::Idle;
        debug!(routine = self.name, ?phase, "Convergence wait");

        let repeating = self.service.set_repeating(session, preview.clone()).await?;
        let trigger = preview
            .clone()
            .with(self.trigger_key, self.trigger_value);
        let triggered = self.service.capture(session, trigger).await?;
        phase = Phase::TriggerSent;
        debug!(routine = self.name, ?phase, "Convergence wait");

        let mut results = stream::select(repeating, triggered);
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut last_state = None;

        let outcome = loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(routine = self.name, ?last_state, timeout_ms = self.timeout.as_millis() as u64, "Convergence timed out");
                    break Ok(Convergence::TimedOut { last_state });
                }
                event = results.next() => match event {
                    Some(CaptureEvent::Completed(result)) => {
                        if phase != Phase::Polling {
                            phase = Phase::Polling;
                            debug!(routine = self.name, ?phase, "Convergence wait");
                        }
                        let state = result.get(self.state_key);
                        if self.is_ready(state) {
                            info!(routine = self.name, ?state, frame = result.frame_number, "Converged");
                            break Ok(Convergence::Converged {
                                state,
                                frame_number: result.frame_number,
                            });
                        }
                        last_state = state;
                    }
                    Some(CaptureEvent::Failed(reason)) => {
                        warn!(routine = self.name, %reason, "Capture failed during convergence");
                        break Err(CameraError::CaptureFailed(reason));
                    }
                    None => {
                        debug!(routine = self.name, ?last_state, "Result streams ended");
                        break Ok(Convergence::StreamEnded { last_state });
                    }
                }
            }
        };

        // Unsubscribe: the repeating request keeps running, its stream does not
        drop(results);
        outcome
    }
}
