use std::ops::BitXor;

use serde::{Deserialize, Serialize};

use crate::{executor::MpcExecutionContext, MpcError};

/// XOR share of a single bit. The shared bit is the XOR of both parties' shares.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitShare(bool);

impl BitShare {
    /// Wrap raw share.
    pub fn wrap(raw: bool) -> Self {
        Self(raw)
    }

    /// Sharing of zero. Both parties hold `false`.
    pub fn zero() -> Self {
        Self(false)
    }

    /// Unwrapped share.
    pub fn raw(self) -> bool {
        self.0
    }

    /// Logical AND.
    /// Cost: 1 AND triple, 1 communication round.
    pub async fn and(self, ctx: &MpcExecutionContext, rhs: Self) -> Self {
        ctx.and(self, rhs).await
    }

    /// Ternary IF operator.
    pub async fn select(self, ctx: &MpcExecutionContext, true_val: Self, false_val: Self) -> Self {
        false_val ^ self.and(ctx, true_val ^ false_val).await
    }
}

/// Logical XOR. Local operation.
impl BitXor for BitShare {
    type Output = BitShare;
    fn bitxor(self, rhs: Self) -> Self::Output {
        BitShare(self.0 ^ rhs.0)
    }
}

/// Bitwise XOR of two shared bit vectors of equal length.
pub fn xor_bits(lhs: &[BitShare], rhs: &[BitShare]) -> Result<Vec<BitShare>, MpcError> {
    if lhs.len() != rhs.len() {
        return Err(MpcError::LengthMismatch {
            lhs: lhs.len(),
            rhs: rhs.len(),
        });
    }
    Ok(lhs.iter().zip(rhs).map(|(&a, &b)| a ^ b).collect())
}
