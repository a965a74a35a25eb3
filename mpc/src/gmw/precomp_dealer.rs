use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{MpcError, Party};

use super::{BitDealer, BitTriple};

/// Precomputed data of one party for the XOR-sharing protocol.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PrecomputedBitData {
    pub party: Party,
    pub and_triples: Vec<BitTriple>,
}

impl PrecomputedBitData {
    /// Load precomputed data from file.
    pub fn load_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        bincode::deserialize_from(reader).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    /// Save precomputed data to file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}

/// Dealer for the XOR-sharing protocol that serves precomputed data.
pub struct PrecomputedBitDealer {
    data: PrecomputedBitData,
}

impl PrecomputedBitDealer {
    /// Create new dealer given precomputed data.
    pub fn new(data: PrecomputedBitData) -> Self {
        Self { data }
    }

    /// Create new dealer from file with precomputed data.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(PrecomputedBitData::load_file(path)?))
    }

    /// Number of AND triples left.
    pub fn remaining_triples(&self) -> usize {
        self.data.and_triples.len()
    }
}

impl BitDealer for PrecomputedBitDealer {
    fn party(&self) -> Party {
        self.data.party
    }

    fn next_and_triple(&mut self) -> Result<BitTriple, MpcError> {
        self.data.and_triples.pop().ok_or(MpcError::DealerExhausted)
    }
}
