use crate::{executor::MpcExecutionContext, join_circuits, MpcError};

use super::{fold_tree, join_circuits_all, BitShare};

/// Compare hidden unsigned integers, provided sharings of their individual bits
/// (least significant bit first). Returns sharing of [lhs > rhs].
/// Cost: 3w-2 AND gates, 1 + ceil(log_2(w)) communication rounds, where w is bit width.
pub async fn bitwise_greater(
    ctx: &MpcExecutionContext,
    lhs: &[BitShare],
    rhs: &[BitShare],
) -> Result<BitShare, MpcError> {
    if lhs.len() != rhs.len() {
        return Err(MpcError::LengthMismatch {
            lhs: lhs.len(),
            rhs: rhs.len(),
        });
    }

    // Given bit sequences L and R, let us define f(L, R) to be a pair (gt, neq), where
    // gt = [L > R] and neq = [L != R]. If A, C are the high parts and B, D the low parts, then
    //   gt(AB, CD)  = gt(A, C) ^ gt(B, D) ^ (gt(B, D) & neq(A, C)),
    //   neq(AB, CD) = neq(A, C) ^ neq(B, D) ^ (neq(A, C) & neq(B, D)).
    // Combining costs 2 AND gates in a single round, so the result is computed
    // in log_2(bits) rounds in binary-tree fashion. No party-dependent constants are needed.

    // 1. Map individual bits into pairs (gt, neq).
    let base_cases = join_circuits_all(lhs.iter().zip(rhs).map(|(&l, &r)| async move {
        let neq = l ^ r;
        (l.and(ctx, neq).await, neq)
    }))
    .await;

    // 2. Fold the sequence of pairs, lower parts come first.
    let (gt, _) = fold_tree(
        base_cases,
        (BitShare::zero(), BitShare::zero()),
        move |low: (BitShare, BitShare), high: (BitShare, BitShare)| async move {
            let (carried, both) = join_circuits!(low.0.and(ctx, high.1), low.1.and(ctx, high.1));
            (high.0 ^ low.0 ^ carried, high.1 ^ low.1 ^ both)
        },
    )
    .await;

    Ok(gt)
}

/// Swap two shared bit vectors of equal length if `cond` is set.
/// Cost: w AND gates, 1 communication round.
pub async fn swap_if(
    ctx: &MpcExecutionContext,
    cond: BitShare,
    lhs: &[BitShare],
    rhs: &[BitShare],
) -> (Vec<BitShare>, Vec<BitShare>) {
    let deltas =
        join_circuits_all(lhs.iter().zip(rhs).map(|(&a, &b)| cond.and(ctx, a ^ b))).await;
    let lhs = lhs.iter().zip(&deltas).map(|(&a, &d)| a ^ d).collect();
    let rhs = rhs.iter().zip(&deltas).map(|(&b, &d)| b ^ d).collect();
    (lhs, rhs)
}
