use rand::{rngs::SmallRng, SeedableRng};

use crate::{MpcError, Party};

use super::{share_random_triple, BitDealer, BitTriple};

/// Insecure dealer for the XOR-sharing protocol that can be used for tests and demos.
/// Both parties derive all triples from a common seed, so each of them could reconstruct them.
pub struct FakeBitDealer {
    party: Party,
    rng: SmallRng,
}

impl FakeBitDealer {
    /// Create new instance. Both parties must use the same seed.
    pub fn new(party: Party, seed: u64) -> Self {
        Self {
            party,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl BitDealer for FakeBitDealer {
    fn party(&self) -> Party {
        self.party
    }

    fn next_and_triple(&mut self) -> Result<BitTriple, MpcError> {
        let [first, second] = share_random_triple(&mut self.rng);
        Ok(match self.party {
            Party::First => first,
            Party::Second => second,
        })
    }
}
