//! Trigger loop owning the state machine
//!
//! Hotkey presses and IPC requests share one queue, so the machine is only
//! ever touched from this task. The current recording state is published on
//! a `watch` channel after every transition.

use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchError, Dispatcher};
use crate::events::{StateEvent, TriggerSource};
use crate::hotkey::PressEvent;

use super::{Decision, KeyEventHandler, RecordingState, ToggleStateMachine};

/// Input accepted by the trigger loop
#[derive(Debug)]
pub enum Trigger {
    /// The watched key was pressed
    Press(PressEvent),
    /// A client asked for a toggle; the decision is sent back
    Toggle { reply: oneshot::Sender<Decision> },
    /// A client asked to transcribe the last recording again
    Retry {
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
}

/// Drives the state machine and dispatches its decisions
pub struct TriggerLoop<D> {
    machine: ToggleStateMachine,
    dispatcher: D,
    event_tx: broadcast::Sender<StateEvent>,
    state_tx: watch::Sender<RecordingState>,
}

impl<D: Dispatcher> TriggerLoop<D> {
    /// Create a new trigger loop
    pub fn new(
        machine: ToggleStateMachine,
        dispatcher: D,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(machine.state());
        Self {
            machine,
            dispatcher,
            event_tx,
            state_tx,
        }
    }

    /// Follow the recording state as the loop changes it
    pub fn state_watch(&self) -> watch::Receiver<RecordingState> {
        self.state_tx.subscribe()
    }

    #[cfg(test)]
    pub fn machine(&self) -> &ToggleStateMachine {
        &self.machine
    }

    /// Process triggers until every sender is gone
    pub async fn run(&mut self, mut trigger_rx: mpsc::Receiver<Trigger>) {
        info!(
            policy = %self.machine.policy(),
            "trigger loop started in Idle state"
        );

        while let Some(trigger) = trigger_rx.recv().await {
            self.process(trigger);
        }

        info!("trigger loop stopped");
    }

    /// Handle a single trigger and return the decision it produced
    ///
    /// A retry leaves the state alone and reports `Ignore`.
    pub fn process(&mut self, trigger: Trigger) -> Decision {
        let started = self.machine.recording_since();

        match trigger {
            Trigger::Press(event) => {
                let decision = self.machine.on_key_event(&event);
                self.act(decision, TriggerSource::Hotkey, event.at, started);
                decision
            }
            Trigger::Toggle { reply } => {
                let now = Instant::now();
                let decision = self.machine.toggle(now);
                self.act(decision, TriggerSource::Ipc, now, started);
                if reply.send(decision).is_err() {
                    debug!("toggle requester went away before the reply");
                }
                decision
            }
            Trigger::Retry { reply } => {
                let result = self.retry();
                if reply.send(result).is_err() {
                    debug!("retry requester went away before the reply");
                }
                Decision::Ignore
            }
        }
    }

    fn retry(&self) -> Result<(), DispatchError> {
        match self.dispatcher.retry() {
            Ok(()) => {
                info!(state = %self.machine.state(), "retrying last recording");
                self.emit(StateEvent::RetryStarted);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "retry not started");
                Err(e)
            }
        }
    }

    fn act(
        &self,
        decision: Decision,
        source: TriggerSource,
        at: Instant,
        started: Option<Instant>,
    ) {
        let event = match decision {
            Decision::Ignore => {
                debug!(?source, state = %self.machine.state(), "press ignored");
                return;
            }
            Decision::Start => {
                info!(?source, "starting xhisper");
                StateEvent::RecordingStarted { source }
            }
            Decision::Stop => {
                let duration_ms = started
                    .map(|t| at.saturating_duration_since(t).as_millis() as u64)
                    .unwrap_or(0);
                info!(?source, duration_ms, "stopping xhisper");
                StateEvent::RecordingStopped {
                    source,
                    duration_ms,
                }
            }
        };

        self.state_tx.send_replace(self.machine.state());

        // The transition stands even if the command cannot be run
        if let Err(e) = self.dispatcher.dispatch(decision) {
            warn!(error = %e, ?decision, "dispatch failed, state kept");
            self.emit(StateEvent::DispatchFailed {
                reason: e.to_string(),
            });
        }

        self.emit(event);
    }

    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting state event");
        let _ = self.event_tx.send(event);
    }
}
