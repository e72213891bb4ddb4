//! Prompt orchestration
//!
//! A prompt plays an output, then collects input, optionally letting the
//! caller barge in over the output. It owns no media: it starts an output
//! child and an input child and sequences them from their events.
//!
//! [`PromptMachine`] is the pure state machine. Each event returns the
//! effects the prompt actor must carry out, in order; the actor does the
//! messaging.
//!
//! ```text
//!  barge-in = false                         barge-in = true
//!
//!  START_OUTPUT                             START_OUTPUT_BARGE
//!    │ output ready: ref reply                │ output ready: start input (barge)
//!  OUTPUT                                   START_INPUT_OUTPUT ── output done ──► START_INPUT_TIMERS
//!    │ output done: start input               │ input ready: ref reply                │ input ready
//!  START_INPUT                              INPUT_OUTPUT ── output done ──┐           │
//!    │ input ready                            │ barge: stop output        │           │
//!    │                                      STOP_OUTPUT ── output done ───┤           │
//!    ▼                                                                    ▼           ▼
//!  INPUT ◄────────────────────────────────────────────────────────────── INPUT (timers started)
//!    │ input done: forward completion
//!  DONE
//! ```
//!
//! A client stop while only the output runs goes through `DONE_STOP_OUTPUT`:
//! the `<stop/>` completion is held back until the output reports done.

use crate::actors::component::complete_with;
use rayo_types::{ns, Element, Stanza, StanzaError};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptState {
    StartOutput,
    Output,
    StartInput,
    StartInputTimers,
    StartOutputBarge,
    StartInputOutput,
    InputOutput,
    StopOutput,
    Input,
    DoneStopOutput,
    Done,
}

impl PromptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptState::StartOutput => "START_OUTPUT",
            PromptState::Output => "OUTPUT",
            PromptState::StartInput => "START_INPUT",
            PromptState::StartInputTimers => "START_INPUT_TIMERS",
            PromptState::StartOutputBarge => "START_OUTPUT_BARGE",
            PromptState::StartInputOutput => "START_INPUT_OUTPUT",
            PromptState::InputOutput => "INPUT_OUTPUT",
            PromptState::StopOutput => "STOP_OUTPUT",
            PromptState::Input => "INPUT",
            PromptState::DoneStopOutput => "DONE_STOP_OUTPUT",
            PromptState::Done => "DONE",
        }
    }

    /// States in which an output child is running and reachable
    fn output_live(&self) -> bool {
        matches!(
            self,
            PromptState::Output
                | PromptState::StartInputOutput
                | PromptState::InputOutput
                | PromptState::StopOutput
                | PromptState::DoneStopOutput
        )
    }
}

impl fmt::Display for PromptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum PromptEvent {
    /// Output child accepted; carries its address
    OutputReady(String),
    /// Output child could not be started; carries the error reply
    OutputFailed(Stanza),
    OutputComplete,
    InputReady(String),
    InputFailed(Stanza),
    /// Input child finished; carries its `<complete>` element
    InputComplete(Element),
    /// Caller started speaking or pressing keys over the output
    Barge,
    /// Client asked the prompt to stop
    Stop,
    /// Client sent an output control (pause, volume-up, ...)
    OutputControl,
    /// The call went away
    Hangup,
}

/// What the prompt actor must do
#[derive(Debug, Clone, PartialEq)]
pub enum PromptEffect {
    /// Ask the call for an input child
    StartInput { start_timers: bool, barge_event: bool },
    /// Acknowledge the original request with a reference to the prompt
    ReplyRef,
    StopOutput,
    StopInput,
    StartInputTimers,
    /// Relay the current request to the output child
    ForwardToOutput(String),
    /// Answer the current request with an empty result
    AcceptRequest,
    /// Answer the current request with an error
    RejectRequest(StanzaError),
    /// Send a completion to the client
    Complete(Element),
    /// Answer the original request with a child's error, verbatim
    ForwardError(Stanza),
    /// Answer the original request with an error
    FailRequest(StanzaError),
    /// Destroy the prompt
    Teardown,
}

#[derive(Debug, Clone)]
pub struct PromptMachine {
    state: PromptState,
    barge_in: bool,
    output: Option<String>,
    input: Option<String>,
    acknowledged: bool,
    pending_completion: Option<Element>,
}

impl PromptMachine {
    pub fn new(barge_in: bool) -> Self {
        Self {
            state: if barge_in {
                PromptState::StartOutputBarge
            } else {
                PromptState::StartOutput
            },
            barge_in,
            output: None,
            input: None,
            acknowledged: false,
            pending_completion: None,
        }
    }

    pub fn state(&self) -> PromptState {
        self.state
    }

    pub fn barge_in(&self) -> bool {
        self.barge_in
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    /// True once the client has its reference reply
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn is_done(&self) -> bool {
        self.state == PromptState::Done
    }

    pub fn on_event(&mut self, event: PromptEvent) -> Vec<PromptEffect> {
        use PromptState::*;

        let before = self.state;
        let effects = match (self.state, event) {
            (Done, PromptEvent::Stop) | (Done, PromptEvent::OutputControl) => {
                vec![PromptEffect::RejectRequest(StanzaError::UnexpectedRequest)]
            }
            (Done, _) => Vec::new(),

            (_, PromptEvent::Hangup) => {
                let effect = if self.acknowledged {
                    PromptEffect::Complete(complete_with(Element::ns("hangup", ns::RAYO_COMPLETE)))
                } else {
                    PromptEffect::FailRequest(StanzaError::ItemNotFound)
                };
                self.finish(vec![effect])
            }

            (StartOutput, PromptEvent::OutputReady(address)) => {
                self.output = Some(address);
                self.state = Output;
                vec![self.acknowledge()]
            }
            (StartOutputBarge, PromptEvent::OutputReady(address)) => {
                self.output = Some(address);
                self.state = StartInputOutput;
                vec![PromptEffect::StartInput {
                    start_timers: false,
                    barge_event: true,
                }]
            }
            (StartOutput | StartOutputBarge, PromptEvent::OutputFailed(error)) => {
                self.finish(vec![PromptEffect::ForwardError(error)])
            }

            (Output, PromptEvent::OutputComplete) => {
                self.output = None;
                self.state = StartInput;
                vec![PromptEffect::StartInput {
                    start_timers: true,
                    barge_event: false,
                }]
            }
            (StartInputOutput, PromptEvent::OutputComplete) => {
                self.output = None;
                self.state = StartInputTimers;
                Vec::new()
            }
            (InputOutput | StopOutput, PromptEvent::OutputComplete) => {
                self.output = None;
                self.state = Input;
                vec![PromptEffect::StartInputTimers]
            }
            (DoneStopOutput, PromptEvent::OutputComplete) => {
                self.output = None;
                let completion = self
                    .pending_completion
                    .take()
                    .unwrap_or_else(|| complete_with(Element::ns("stop", ns::RAYO_COMPLETE)));
                self.finish(vec![PromptEffect::Complete(completion)])
            }

            (StartInput, PromptEvent::InputReady(address)) => {
                self.input = Some(address);
                self.state = Input;
                Vec::new()
            }
            (StartInputOutput, PromptEvent::InputReady(address)) => {
                self.input = Some(address);
                self.state = InputOutput;
                vec![self.acknowledge()]
            }
            (StartInputTimers, PromptEvent::InputReady(address)) => {
                self.input = Some(address);
                self.state = Input;
                let mut effects = Vec::new();
                if !self.acknowledged {
                    effects.push(self.acknowledge());
                }
                effects.push(PromptEffect::StartInputTimers);
                effects
            }
            (StartInput | StartInputOutput | StartInputTimers, PromptEvent::InputFailed(error)) => {
                let mut effects = Vec::new();
                if self.state.output_live() {
                    effects.push(PromptEffect::StopOutput);
                }
                if self.acknowledged {
                    let text = error
                        .error_condition()
                        .map(|c| c.condition())
                        .unwrap_or("input failed");
                    effects.push(PromptEffect::Complete(complete_with(
                        Element::ns("error", ns::RAYO_COMPLETE).with_text(text),
                    )));
                } else {
                    effects.push(PromptEffect::ForwardError(error));
                }
                self.finish(effects)
            }

            (state, PromptEvent::InputComplete(completion)) if state != DoneStopOutput => {
                let mut effects = Vec::new();
                if !self.acknowledged {
                    effects.push(self.acknowledge());
                }
                effects.push(PromptEffect::Complete(completion));
                if matches!(state, InputOutput | StartInputOutput) {
                    effects.push(PromptEffect::StopOutput);
                }
                self.finish(effects)
            }

            (InputOutput, PromptEvent::Barge) => {
                self.state = StopOutput;
                vec![PromptEffect::StopOutput]
            }

            (Output, PromptEvent::Stop) => {
                self.pending_completion =
                    Some(complete_with(Element::ns("stop", ns::RAYO_COMPLETE)));
                self.state = DoneStopOutput;
                vec![PromptEffect::AcceptRequest, PromptEffect::StopOutput]
            }
            (Input | InputOutput | StopOutput, PromptEvent::Stop) => {
                vec![PromptEffect::AcceptRequest, PromptEffect::StopInput]
            }
            (_, PromptEvent::Stop) => {
                vec![PromptEffect::RejectRequest(StanzaError::UnexpectedRequest)]
            }

            (state, PromptEvent::OutputControl) => match (&self.output, state.output_live()) {
                (Some(output), true) => vec![PromptEffect::ForwardToOutput(output.clone())],
                _ => vec![PromptEffect::RejectRequest(StanzaError::UnexpectedRequest)],
            },

            (state, event) => {
                debug!(state = %state, event = ?event, "Prompt event ignored");
                Vec::new()
            }
        };
        if before != self.state {
            debug!(from = %before, to = %self.state, "Prompt state change");
        }
        effects
    }

    fn acknowledge(&mut self) -> PromptEffect {
        self.acknowledged = true;
        PromptEffect::ReplyRef
    }

    fn finish(&mut self, mut effects: Vec<PromptEffect>) -> Vec<PromptEffect> {
        self.state = PromptState::Done;
        effects.push(PromptEffect::Teardown);
        effects
    }
}
