use std::future::Future;

use itertools::Itertools;

use super::join_circuits_all;

/// Reduce a sequence level by level, combining neighbours concurrently.
/// The combining function gets the earlier element first, and an odd element left at the end
/// of a level is carried over unchanged. `n` elements take ceil(log_2(n)) levels.
pub async fn fold_tree<T, F, Fut>(iter: impl IntoIterator<Item = T>, default: T, combine_fn: F) -> T
where
    F: Copy + Fn(T, T) -> Fut,
    Fut: Future<Output = T>,
{
    let mut level: Vec<T> = iter.into_iter().collect();

    while level.len() > 1 {
        let mut pairs = level.into_iter().tuples::<(T, T)>();
        let mut next =
            join_circuits_all(pairs.by_ref().map(|(low, high)| combine_fn(low, high))).await;
        next.extend(pairs.into_buffer());
        level = next;
    }

    level.pop().unwrap_or(default)
}
