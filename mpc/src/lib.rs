use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod circuits;
pub mod executor;
pub mod gmw;
pub mod plaintext;
pub mod transport;

pub use circuits::BitShare;
use transport::TransportError;

/// One of the two participants of a two-party computation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    /// Party whose inputs are shared with `share_as_first_party` (circuit generator).
    First,
    /// Party whose inputs are shared with `share_as_second_party` (circuit evaluator).
    Second,
}

impl Party {
    /// Numeric ID of the party, as used in network configuration.
    pub fn id(self) -> usize {
        match self {
            Party::First => 0,
            Party::Second => 1,
        }
    }

    /// Party with given numeric ID.
    pub fn from_id(id: usize) -> Option<Self> {
        match id {
            0 => Some(Party::First),
            1 => Some(Party::Second),
            _ => None,
        }
    }

    /// The other participant.
    pub fn peer(self) -> Self {
        match self {
            Party::First => Party::Second,
            Party::Second => Party::First,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::First => write!(f, "first party"),
            Party::Second => write!(f, "second party"),
        }
    }
}

/// Shape of a bit matrix submitted as input: one row per value, `width` bits per row.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixShape {
    pub rows: usize,
    pub width: usize,
}

impl MatrixShape {
    /// Shape of given matrix. All rows must have the same width.
    pub fn of(matrix: &[Vec<bool>]) -> Result<Self, MpcError> {
        let width = matrix.first().map_or(0, Vec::len);
        if let Some((row, bits)) = matrix.iter().enumerate().find(|(_, x)| x.len() != width) {
            return Err(MpcError::RaggedInput {
                row,
                width: bits.len(),
                expected: width,
            });
        }
        Ok(Self {
            rows: matrix.len(),
            width,
        })
    }

    /// Total number of bits.
    pub fn num_bits(&self) -> usize {
        self.rows * self.width
    }
}

impl fmt::Display for MatrixShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows x {} bits", self.rows, self.width)
    }
}

/// Error during secure computation.
#[derive(Debug, Error)]
pub enum MpcError {
    #[error("input shape mismatch: local {local}, peer {peer}")]
    ShapeMismatch { local: MatrixShape, peer: MatrixShape },

    #[error("input row {row} has {width} bits, expected {expected}")]
    RaggedInput {
        row: usize,
        width: usize,
        expected: usize,
    },

    #[error("operand length mismatch: {lhs} and {rhs} bits")]
    LengthMismatch { lhs: usize, rhs: usize },

    #[error("dealer ran out of AND triples")]
    DealerExhausted,

    #[error("unexpected message from peer while processing {0}")]
    UnexpectedMessage(&'static str),

    #[error("circuit awaits something other than AND gates")]
    CircuitStalled,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl MpcError {
    /// Whether the error is a shape disagreement detected before any secret was exchanged.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MpcError::ShapeMismatch { .. } | MpcError::RaggedInput { .. }
        )
    }
}

/// Low-level interface of a two-party protocol over XOR-shared bits.
/// Every call is made by both parties in the same order and completes only when both sides did.
#[async_trait(?Send)]
pub trait MpcEngine {
    /// Role of the current party.
    fn party(&self) -> Party;

    /// Share a bit matrix owned by `owner`.
    /// The matrix passed by the other party is only used to agree on the shape.
    async fn process_inputs(
        &mut self,
        owner: Party,
        rows: &[Vec<bool>],
    ) -> Result<Vec<Vec<BitShare>>, MpcError>;

    /// Process bundle of AND gates issued in a single round.
    async fn process_and_gates(
        &mut self,
        requests: Vec<(BitShare, BitShare)>,
    ) -> Result<Vec<BitShare>, MpcError>;

    /// Reconstruct shared bits at `recipient`. Returns `None` on the other party.
    async fn process_reveal(
        &mut self,
        recipient: Party,
        shares: Vec<BitShare>,
    ) -> Result<Option<Vec<bool>>, MpcError>;
}

/// Secure computation environment consumed by two-party protocols.
///
/// Wires are opaque handles of secret bits; a row of wires is a fixed-width unsigned integer,
/// least significant bit first. Backends can be swapped without touching protocol logic.
#[async_trait(?Send)]
pub trait SecureEnvironment {
    /// Opaque handle of one secret bit.
    type Wire: Copy;

    /// Role of the current party.
    fn party(&self) -> Party;

    /// Submit a matrix as input of the first party.
    async fn share_as_first_party(
        &mut self,
        matrix: &[Vec<bool>],
    ) -> Result<Vec<Vec<Self::Wire>>, MpcError>;

    /// Submit a matrix as input of the second party.
    async fn share_as_second_party(
        &mut self,
        matrix: &[Vec<bool>],
    ) -> Result<Vec<Vec<Self::Wire>>, MpcError>;

    /// Bitwise XOR of two equal-length rows.
    fn evaluate_xor(&self, a: &[Self::Wire], b: &[Self::Wire])
        -> Result<Vec<Self::Wire>, MpcError>;

    /// Sort rows as unsigned integers with a data-independent sequence of operations.
    async fn evaluate_oblivious_sort(
        &mut self,
        rows: Vec<Vec<Self::Wire>>,
        ascending: bool,
    ) -> Result<Vec<Vec<Self::Wire>>, MpcError>;

    /// Disclose a row to the first party. Returns `None` on the second party.
    async fn reveal_to_first_party(
        &mut self,
        row: &[Self::Wire],
    ) -> Result<Option<Vec<bool>>, MpcError>;

    /// Disclose a row to the second party. Returns `None` on the first party.
    async fn reveal_to_second_party(
        &mut self,
        row: &[Self::Wire],
    ) -> Result<Option<Vec<bool>>, MpcError>;
}
