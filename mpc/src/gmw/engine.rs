use async_trait::async_trait;
use futures::{Sink, Stream};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{transport::PeerTransport, BitShare, MatrixShape, MpcEngine, MpcError, Party};

use super::BitDealer;

/// Message of the XOR-sharing protocol. Bits travel packed, eight per byte.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GmwMessage {
    Shape(MatrixShape),
    InputMasks(Vec<u8>),
    Openings(Vec<u8>),
    Reveal(Vec<u8>),
}

/// Two-party protocol over XOR-shared bits.
pub struct GmwEngine<Dealer, Channel> {
    dealer: Dealer,
    transport: PeerTransport<GmwMessage, Channel>,
    rng: StdRng,
}

impl<Dealer: BitDealer, Channel> GmwEngine<Dealer, Channel> {
    pub fn new(dealer: Dealer, transport: PeerTransport<GmwMessage, Channel>) -> Self {
        Self::with_rng(dealer, transport, StdRng::from_entropy())
    }

    /// Create engine that draws input masks from given generator.
    pub fn with_rng(
        dealer: Dealer,
        transport: PeerTransport<GmwMessage, Channel>,
        rng: StdRng,
    ) -> Self {
        debug_assert_eq!(dealer.party(), transport.party());
        Self {
            dealer,
            transport,
            rng,
        }
    }

    /// Dealer serving correlated randomness.
    pub fn dealer(&self) -> &Dealer {
        &self.dealer
    }
}

impl<Dealer, E, Channel> GmwEngine<Dealer, Channel>
where
    Channel: Stream<Item = Result<GmwMessage, E>> + Sink<GmwMessage> + Unpin,
{
    /// Agree with peer on the shape of the matrix being shared.
    async fn agree_on_shape(&mut self, local: MatrixShape) -> Result<MatrixShape, MpcError> {
        match self.transport.exchange(GmwMessage::Shape(local)).await? {
            GmwMessage::Shape(peer) if peer == local => Ok(local),
            GmwMessage::Shape(peer) => Err(MpcError::ShapeMismatch { local, peer }),
            _ => Err(MpcError::UnexpectedMessage("input shape")),
        }
    }
}

#[async_trait(?Send)]
impl<Dealer, E, Channel> MpcEngine for GmwEngine<Dealer, Channel>
where
    Dealer: BitDealer,
    Channel: Stream<Item = Result<GmwMessage, E>> + Sink<GmwMessage> + Unpin,
{
    fn party(&self) -> Party {
        self.transport.party()
    }

    async fn process_inputs(
        &mut self,
        owner: Party,
        rows: &[Vec<bool>],
    ) -> Result<Vec<Vec<BitShare>>, MpcError> {
        let shape = self.agree_on_shape(MatrixShape::of(rows)?).await?;
        if shape.num_bits() == 0 {
            return Ok(vec![Vec::new(); shape.rows]);
        }

        let shares: Vec<BitShare> = if owner == self.party() {
            let masks: Vec<bool> = (0..shape.num_bits()).map(|_| self.rng.gen()).collect();
            self.transport
                .send(GmwMessage::InputMasks(pack_bits(&masks)))
                .await?;
            rows.iter()
                .flatten()
                .zip(&masks)
                .map(|(&x, &r)| BitShare::wrap(x ^ r))
                .collect()
        } else {
            match self.transport.receive().await? {
                GmwMessage::InputMasks(bytes) => unpack_bits(&bytes, shape.num_bits())?
                    .into_iter()
                    .map(BitShare::wrap)
                    .collect(),
                _ => return Err(MpcError::UnexpectedMessage("input masks")),
            }
        };

        debug!(%owner, %shape, "Input shared");
        Ok(shares.chunks(shape.width).map(<[_]>::to_vec).collect())
    }

    async fn process_and_gates(
        &mut self,
        requests: Vec<(BitShare, BitShare)>,
    ) -> Result<Vec<BitShare>, MpcError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let triples = (0..requests.len())
            .map(|_| self.dealer.next_and_triple())
            .collect::<Result<Vec<_>, _>>()?;

        // First half holds the masked left operands, second half the masked right ones.
        let masked: Vec<bool> = requests
            .iter()
            .zip(&triples)
            .map(|((x, _), t)| (*x ^ t.a).raw())
            .chain(
                requests
                    .iter()
                    .zip(&triples)
                    .map(|((_, y), t)| (*y ^ t.b).raw()),
            )
            .collect();

        let peer_masked = match self
            .transport
            .exchange(GmwMessage::Openings(pack_bits(&masked)))
            .await?
        {
            GmwMessage::Openings(bytes) => unpack_bits(&bytes, masked.len())?,
            _ => return Err(MpcError::UnexpectedMessage("AND gates")),
        };

        let n = requests.len();
        let is_first = self.party() == Party::First;
        let results = triples
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let d = masked[i] ^ peer_masked[i];
                let e = masked[n + i] ^ peer_masked[n + i];
                let mut z = t.c.raw() ^ (d & t.b.raw()) ^ (e & t.a.raw());
                if is_first {
                    z ^= d & e;
                }
                BitShare::wrap(z)
            })
            .collect();

        Ok(results)
    }

    async fn process_reveal(
        &mut self,
        recipient: Party,
        shares: Vec<BitShare>,
    ) -> Result<Option<Vec<bool>>, MpcError> {
        if recipient != self.party() {
            let bits: Vec<bool> = shares.iter().map(|x| x.raw()).collect();
            self.transport.send(GmwMessage::Reveal(pack_bits(&bits))).await?;
            debug!(%recipient, bits = bits.len(), "Shares sent for reveal");
            return Ok(None);
        }

        let peer_bits = match self.transport.receive().await? {
            GmwMessage::Reveal(bytes) => unpack_bits(&bytes, shares.len())?,
            _ => return Err(MpcError::UnexpectedMessage("reveal")),
        };
        let bits = shares
            .iter()
            .zip(peer_bits)
            .map(|(x, y)| x.raw() ^ y)
            .collect();
        debug!(bits = shares.len(), "Output revealed");
        Ok(Some(bits))
    }
}

fn pack_bits(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &bit)| byte | ((bit as u8) << i))
        })
        .collect()
}

fn unpack_bits(bytes: &[u8], len: usize) -> Result<Vec<bool>, MpcError> {
    if bytes.len() != (len + 7) / 8 {
        return Err(MpcError::LengthMismatch {
            lhs: len,
            rhs: bytes.len() * 8,
        });
    }
    Ok((0..len).map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1).collect())
}
