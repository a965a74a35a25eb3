use tracing::{info, warn};

use crate::{Role, RoleState};

/// Milestone of a protocol run.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolEvent {
    StateChanged {
        role: Role,
        from: RoleState,
        to: RoleState,
    },
    InputPrepared {
        role: Role,
        rows: usize,
        skipped_rows: usize,
        max_n: f64,
    },
    ComputationFinished {
        role: Role,
        rows: usize,
    },
    MedianDisclosed {
        role: Role,
        median: f64,
    },
    Aborted {
        role: Role,
        state: RoleState,
        reason: String,
    },
}

/// Receiver of protocol milestones.
pub trait EventSink {
    fn emit(&mut self, event: ProtocolEvent);
}

impl EventSink for Vec<ProtocolEvent> {
    fn emit(&mut self, event: ProtocolEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: ProtocolEvent) {
        (**self).emit(event);
    }
}

/// Sink that writes events to the `tracing` log.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::StateChanged { role, from, to } => {
                info!(%role, %from, %to, "State changed")
            }
            ProtocolEvent::InputPrepared {
                role,
                rows,
                skipped_rows,
                max_n,
            } => info!(%role, rows, skipped_rows, max_n, "Input prepared"),
            ProtocolEvent::ComputationFinished { role, rows } => {
                info!(%role, rows, "Median computed")
            }
            ProtocolEvent::MedianDisclosed { role, median } => {
                info!(%role, "Median standard error is {median}")
            }
            ProtocolEvent::Aborted {
                role,
                state,
                reason,
            } => warn!(%role, %state, %reason, "Protocol aborted"),
        }
    }
}
