use std::{cmp, collections::HashMap};

use crate::{executor::MpcExecutionContext, MpcError};

use super::{bitwise_greater, join_circuits_all, swap_if, BitShare};

/// Comparator of a sorting network. After applying it, element at `.0` is not greater than element at `.1`.
pub type Comparator = (usize, usize);

/// Bitonic sorting network for `n` elements (not necessarily a power of two), produced layer by layer.
/// Comparators within a layer touch disjoint elements. Only the current layer is held in memory.
pub fn sorting_network(n: usize, ascending: bool) -> impl Iterator<Item = Vec<Comparator>> {
    let depths = SortDepths::new(n);
    (0..depths.get(n)).map(move |layer| {
        let mut comparators = Vec::new();
        depths.sort_layer(&mut comparators, 0, n, ascending, layer);
        comparators
    })
}

/// Number of layers of [`sorting_network`].
pub fn sorting_network_depth(n: usize) -> usize {
    SortDepths::new(n).get(n)
}

/// Depths of the sub-networks of a sorting network. Halving `n` repeatedly yields at most two
/// distinct sizes per level, so the table stays small.
struct SortDepths(HashMap<usize, usize>);

impl SortDepths {
    fn new(n: usize) -> Self {
        let mut depths = SortDepths(HashMap::new());
        depths.fill(n);
        depths
    }

    fn fill(&mut self, n: usize) {
        if n <= 1 || self.0.contains_key(&n) {
            return;
        }
        let m = n / 2;
        self.fill(m);
        self.fill(n - m);
        let depth = self.halves(n) + merge_depth(n);
        self.0.insert(n, depth);
    }

    fn get(&self, n: usize) -> usize {
        self.0.get(&n).copied().unwrap_or(0)
    }

    /// Layers taken by sorting both halves of `n` elements side by side.
    fn halves(&self, n: usize) -> usize {
        let m = n / 2;
        cmp::max(self.get(m), self.get(n - m))
    }

    /// Comparators of the sorting network on `lo..lo + n` placed in its `layer`-th layer.
    /// Both halves are sorted in the same layers; the merge starts after the deeper one.
    fn sort_layer(
        &self,
        out: &mut Vec<Comparator>,
        lo: usize,
        n: usize,
        ascending: bool,
        layer: usize,
    ) {
        if n <= 1 {
            return;
        }
        let m = n / 2;
        let halves_depth = self.halves(n);
        if layer < halves_depth {
            self.sort_layer(out, lo, m, !ascending, layer);
            self.sort_layer(out, lo + m, n - m, ascending, layer);
        } else {
            merge_layer(out, lo, n, ascending, layer - halves_depth);
        }
    }
}

fn merge_depth(n: usize) -> usize {
    n.next_power_of_two().trailing_zeros() as usize
}

fn merge_layer(out: &mut Vec<Comparator>, lo: usize, n: usize, ascending: bool, layer: usize) {
    if n <= 1 {
        return;
    }
    let m = greatest_power_of_two_below(n);
    if layer == 0 {
        for i in lo..lo + n - m {
            out.push(if ascending { (i, i + m) } else { (i + m, i) });
        }
    } else {
        merge_layer(out, lo, m, ascending, layer - 1);
        merge_layer(out, lo + m, n - m, ascending, layer - 1);
    }
}

/// Greatest power of two strictly less than `n`, for n > 1.
fn greatest_power_of_two_below(n: usize) -> usize {
    n.next_power_of_two() >> 1
}

/// Number of comparators of the sorting network for `n` elements.
pub fn comparators_for_sort(n: usize) -> usize {
    fn sort_count(n: usize, memo: &mut HashMap<usize, usize>) -> usize {
        if n <= 1 {
            return 0;
        }
        if let Some(&count) = memo.get(&n) {
            return count;
        }
        let m = n / 2;
        let count = sort_count(m, memo) + sort_count(n - m, memo) + merge_count(n);
        memo.insert(n, count);
        count
    }

    fn merge_count(n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        let m = greatest_power_of_two_below(n);
        // Merging 2^k elements takes k layers of 2^(k-1) comparators.
        let full = m / 2 * m.trailing_zeros() as usize;
        (n - m) + full + merge_count(n - m)
    }

    sort_count(n, &mut HashMap::new())
}

/// Number of AND gates needed to sort `rows` integers of `width` bits.
pub fn and_gates_for_sort(rows: usize, width: usize) -> usize {
    if width == 0 {
        return 0;
    }
    // Comparison (3w-2) and conditional swap (w).
    comparators_for_sort(rows) * (4 * width - 2)
}

/// Obliviously sort shared unsigned integers (bit decompositions, least significant bit first).
/// Sequence of operations depends only on the number of rows and their width.
pub async fn sort(
    ctx: &MpcExecutionContext,
    rows: &mut [Vec<BitShare>],
    ascending: bool,
) -> Result<(), MpcError> {
    let width = rows.first().map_or(0, Vec::len);
    if let Some(row) = rows.iter().find(|row| row.len() != width) {
        return Err(MpcError::LengthMismatch {
            lhs: width,
            rhs: row.len(),
        });
    }

    for layer in sorting_network(rows.len(), ascending) {
        let results = {
            let rows = &*rows;
            join_circuits_all(layer.into_iter().map(|(i, j)| async move {
                let (a, b) = (&rows[i], &rows[j]);
                let should_swap = bitwise_greater(ctx, a, b).await?;
                let (a, b) = swap_if(ctx, should_swap, a, b).await;
                Ok::<_, MpcError>((i, j, a, b))
            }))
            .await
        };

        for result in results {
            let (i, j, a, b) = result?;
            rows[i] = a;
            rows[j] = b;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::{
        circuits::{testing::*, *},
        executor::MpcExecutor,
        plaintext::PlainMpcEngine,
        MpcError, Party,
    };

    /// Apply network to plaintext values.
    fn apply_network(values: &mut [u64], ascending: bool) {
        for layer in sorting_network(values.len(), ascending) {
            for (i, j) in layer {
                if values[i] > values[j] {
                    values.swap(i, j);
                }
            }
        }
    }

    #[test]
    fn test_network_sorts_all_zero_one_sequences() {
        for n in 0..=12 {
            for mask in 0u64..(1 << n) {
                let mut values: Vec<_> = (0..n).map(|i| (mask >> i) & 1).collect();
                let mut expected = values.clone();
                expected.sort();

                apply_network(&mut values, true);
                assert_eq!(values, expected, "n = {n}, mask = {mask:b}");
            }
        }
    }

    #[test]
    fn test_network_layers_are_disjoint() {
        for n in [2, 3, 5, 8, 13, 100] {
            for layer in sorting_network(n, true) {
                let mut touched = vec![false; n];
                for (i, j) in layer {
                    assert!(!touched[i] && !touched[j]);
                    touched[i] = true;
                    touched[j] = true;
                }
            }
        }
    }

    #[test]
    fn test_network_depth() {
        // Bitonic sort of 2^k elements has k(k+1)/2 layers.
        assert_eq!(sorting_network(1, true).count(), 0);
        assert_eq!(sorting_network(2, true).count(), 1);
        assert_eq!(sorting_network(8, true).count(), 6);
        assert_eq!(sorting_network(1024, true).count(), 55);
        assert_eq!(sorting_network_depth(1 << 20), 210);
    }

    #[test]
    fn test_comparator_count_matches_network() {
        for n in 0..300 {
            let generated: usize = sorting_network(n, true).map(|layer| layer.len()).sum();
            assert_eq!(comparators_for_sort(n), generated, "n = {n}");
        }
    }

    #[test]
    fn test_gate_count_for_large_studies() {
        // Bitonic sort of 2^k elements has k(k+1)/2 layers of 2^(k-1) comparators.
        assert_eq!(comparators_for_sort(1 << 20), 110_100_480);
        assert_eq!(and_gates_for_sort(1 << 20, 1), 2 * 110_100_480);
        assert!(comparators_for_sort(3_000_000) > comparators_for_sort(1 << 21));
    }

    proptest! {
        #[test]
        fn prop_network_sorts(mut values in prop::collection::vec(0u64..1000, 0..64), ascending: bool) {
            let mut expected = values.clone();
            expected.sort();
            if !ascending {
                expected.reverse();
            }

            apply_network(&mut values, ascending);
            prop_assert_eq!(values, expected);
        }
    }

    #[tokio::test]
    async fn test_sort() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let mut rows = [2, 1, 9, 3, 4, 7, 6, 8, 5].map(|x| plain_bits(x, 8));
                sort(ctx, &mut rows, true).await.unwrap();
                let values: Vec<_> = rows.iter().map(|row| open_bits(row)).collect();
                assert_eq!(values, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_sort_descending_with_duplicates() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let mut rows = [5, 1, 5, 0, 3, 3].map(|x| plain_bits(x, 4));
                sort(ctx, &mut rows, false).await.unwrap();
                let values: Vec<_> = rows.iter().map(|row| open_bits(row)).collect();
                assert_eq!(values, vec![5, 5, 3, 3, 1, 0]);
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_sort_ragged_rows() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let mut rows = vec![plain_bits(1, 8), plain_bits(2, 4)];
                let result = sort(ctx, &mut rows, true).await;
                assert!(matches!(result, Err(MpcError::LengthMismatch { .. })));
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_sort_gate_count() {
        let mut executor = MpcExecutor::new(PlainMpcEngine::new(Party::First));
        executor
            .run_circuit(|ctx| {
                Box::pin(async move {
                    let mut rows: Vec<_> = (0..7).map(|x| plain_bits(x * 3 % 7, 16)).collect();
                    sort(ctx, &mut rows, true).await.unwrap();
                })
            })
            .await
            .unwrap();

        assert_eq!(executor.stats().num_and_gates, and_gates_for_sort(7, 16));
    }
}
