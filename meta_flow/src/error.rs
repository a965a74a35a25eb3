use mpc::MpcError;
use thiserror::Error;

use crate::{EncodingError, RangeError, RoleState, StudyError};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Study(#[from] StudyError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("study has no usable rows")]
    EmptyDataset,

    #[error("parties disagree on protocol parameters: {0}")]
    Configuration(#[source] MpcError),

    #[error("protocol aborted while {phase}: {source}")]
    Abort {
        phase: RoleState,
        #[source]
        source: MpcError,
    },

    #[error("protocol cannot be started in state {0}")]
    InvalidState(RoleState),
}

impl ProtocolError {
    /// Classify failure of the secure environment during given phase.
    pub fn from_mpc(phase: RoleState, err: MpcError) -> Self {
        if err.is_configuration() {
            ProtocolError::Configuration(err)
        } else {
            ProtocolError::Abort { phase, source: err }
        }
    }

    /// Whether the run was rejected before any secret was exchanged because of its setup.
    pub fn is_configuration(&self) -> bool {
        match self {
            ProtocolError::Study(err) => err.is_configuration(),
            ProtocolError::Encoding(EncodingError::BitWidth(_) | EncodingError::Scale(_)) => true,
            ProtocolError::Configuration(_) => true,
            _ => false,
        }
    }
}
