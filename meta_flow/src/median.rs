use mpc::{MatrixShape, MpcError, SecureEnvironment};

use crate::{ProtocolError, RoleState};

/// Median of the element-wise XOR of two secret matrices.
///
/// Rows are combined pairwise, sorted obliviously in ascending order and the row at index
/// `n / 2` is returned. For an even number of rows this is the upper of the two middle rows.
pub async fn oblivious_median<Env: SecureEnvironment>(
    env: &mut Env,
    first: Vec<Vec<Env::Wire>>,
    second: Vec<Vec<Env::Wire>>,
) -> Result<Vec<Env::Wire>, ProtocolError> {
    let abort = |err| ProtocolError::from_mpc(RoleState::Computing, err);

    if first.len() != second.len() {
        let shape = |rows: &[Vec<Env::Wire>]| MatrixShape {
            rows: rows.len(),
            width: rows.first().map_or(0, Vec::len),
        };
        return Err(ProtocolError::Configuration(MpcError::ShapeMismatch {
            local: shape(&first),
            peer: shape(&second),
        }));
    }
    if first.is_empty() {
        return Err(ProtocolError::EmptyDataset);
    }

    let mut combined = first
        .iter()
        .zip(&second)
        .map(|(a, b)| env.evaluate_xor(a, b))
        .collect::<Result<Vec<_>, _>>()
        .map_err(abort)?;

    if combined.len() > 1 {
        combined = env
            .evaluate_oblivious_sort(combined, true)
            .await
            .map_err(abort)?;
    }

    let middle = combined.len() / 2;
    Ok(combined.swap_remove(middle))
}
