//! Two-party protocol over XOR-shared bits with AND gates evaluated using Beaver bit triples.

mod engine;
pub use engine::{GmwEngine, GmwMessage};

mod fake_dealer;
pub use fake_dealer::FakeBitDealer;

mod precomp_dealer;
pub use precomp_dealer::{PrecomputedBitData, PrecomputedBitDealer};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{BitShare, MpcError, Party};

/// Sharing of a random triple (a, b, c) that satisfies a & b = c.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitTriple {
    pub a: BitShare,
    pub b: BitShare,
    pub c: BitShare,
}

/// Dealer of correlated randomness for the XOR-sharing protocol.
pub trait BitDealer {
    /// Party whose shares this dealer serves.
    fn party(&self) -> Party;

    /// Next AND triple. Both parties must consume triples in the same order.
    fn next_and_triple(&mut self) -> Result<BitTriple, MpcError>;
}

/// Generate a random AND triple and split it into shares of the first and the second party.
pub fn share_random_triple(rng: &mut impl Rng) -> [BitTriple; 2] {
    let (a, b): (bool, bool) = (rng.gen(), rng.gen());
    let c = a & b;
    let first = BitTriple {
        a: BitShare::wrap(rng.gen()),
        b: BitShare::wrap(rng.gen()),
        c: BitShare::wrap(rng.gen()),
    };
    let second = BitTriple {
        a: BitShare::wrap(a) ^ first.a,
        b: BitShare::wrap(b) ^ first.b,
        c: BitShare::wrap(c) ^ first.c,
    };
    [first, second]
}
