mod bitwise;
mod boolean;
mod sequences;
mod sorting;

pub use bitwise::*;
pub use boolean::*;
pub use sequences::*;
pub use sorting::*;

use std::{future::Future, task::Poll};

use futures::future;

pub use futures; // Reexport futures crate for join_circuits! macro.

/// Wait on multiple concurrent branches, returning when **all** branches complete.
/// This macro guarantees deterministic polling order of provided futures,
/// which makes it safe to use with our async circuits.
#[macro_export]
macro_rules! join_circuits {
    ($($tokens:tt)*) => {{
        $crate::circuits::futures::join!($( $tokens )*)
    }}
}

/// Wait on a sequence of circuit branches, returning outputs in order.
/// Every pending branch is polled in order on each wake-up, so both parties
/// issue their AND gates in the same order.
pub async fn join_circuits_all<F: Future>(branches: impl IntoIterator<Item = F>) -> Vec<F::Output> {
    let mut branches: Vec<_> = branches
        .into_iter()
        .map(|branch| Box::pin(future::maybe_done(branch)))
        .collect();

    future::poll_fn(move |cx| {
        let mut all_done = true;
        for branch in branches.iter_mut() {
            if branch.as_mut().poll(cx).is_pending() {
                all_done = false;
            }
        }
        if !all_done {
            return Poll::Pending;
        }
        Poll::Ready(
            branches
                .iter_mut()
                .map(|branch| branch.as_mut().take_output().expect("Branch output taken twice"))
                .collect(),
        )
    })
    .await
}
