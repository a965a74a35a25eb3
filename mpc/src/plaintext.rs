use async_trait::async_trait;

use crate::*;

/// Mock MPC engine that computes result in plain on a single node.
///
/// Shares are the plaintext bits themselves, and matrices submitted for either party are taken
/// at face value, so one node can play a whole two-party computation.
/// Reveals succeed only for the party this engine impersonates.
pub struct PlainMpcEngine {
    party: Party,
    num_and_gates: usize,
    num_rounds: usize,
}

impl PlainMpcEngine {
    /// Create a new instance of mock impersonating given party.
    pub fn new(party: Party) -> Self {
        Self {
            party,
            num_and_gates: 0,
            num_rounds: 0,
        }
    }

    /// Get total count of evaluated AND gates.
    pub fn num_and_gates(&self) -> usize {
        self.num_and_gates
    }

    /// Get total number of rounds.
    pub fn num_rounds(&self) -> usize {
        self.num_rounds
    }
}

impl Default for PlainMpcEngine {
    fn default() -> Self {
        Self::new(Party::First)
    }
}

#[async_trait(?Send)]
impl MpcEngine for PlainMpcEngine {
    fn party(&self) -> Party {
        self.party
    }

    async fn process_inputs(
        &mut self,
        _owner: Party,
        rows: &[Vec<bool>],
    ) -> Result<Vec<Vec<BitShare>>, MpcError> {
        MatrixShape::of(rows)?;
        Ok(rows
            .iter()
            .map(|row| row.iter().copied().map(BitShare::wrap).collect())
            .collect())
    }

    async fn process_and_gates(
        &mut self,
        requests: Vec<(BitShare, BitShare)>,
    ) -> Result<Vec<BitShare>, MpcError> {
        self.num_and_gates += requests.len();
        self.num_rounds += 1;
        Ok(requests
            .into_iter()
            .map(|(a, b)| BitShare::wrap(a.raw() & b.raw()))
            .collect())
    }

    async fn process_reveal(
        &mut self,
        recipient: Party,
        shares: Vec<BitShare>,
    ) -> Result<Option<Vec<bool>>, MpcError> {
        Ok((recipient == self.party).then(|| shares.into_iter().map(BitShare::raw).collect()))
    }
}
