use std::{
    cell::{Cell, RefCell},
    mem,
    task::Poll,
};

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use tracing::debug;

use crate::{circuits, BitShare, MpcEngine, MpcError, Party, SecureEnvironment};

/// Handle passed to async circuits. Collects AND gates issued during a round.
pub struct MpcExecutionContext {
    party: Party,
    and_buffer: RoundCommandBuffer<(BitShare, BitShare), BitShare>,
}

impl MpcExecutionContext {
    fn new(party: Party) -> Self {
        Self {
            party,
            and_buffer: RoundCommandBuffer::new(),
        }
    }

    /// Role of the current party.
    pub fn party(&self) -> Party {
        self.party
    }

    /// AND of two shared bits. Requires communication.
    pub async fn and(&self, a: BitShare, b: BitShare) -> BitShare {
        self.and_buffer.queue((a, b)).await
    }
}

/// Statistics of circuit execution.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MpcExecutionStats {
    pub num_and_gates: usize,
    pub num_rounds: usize,
}

/// MPC circuit executor.
pub struct MpcExecutor<E> {
    engine: E,
    context: MpcExecutionContext,
    stats: MpcExecutionStats,
}

impl<E: MpcEngine> MpcExecutor<E> {
    /// Create new executor on top of given engine.
    pub fn new(engine: E) -> Self {
        let context = MpcExecutionContext::new(engine.party());
        Self {
            engine,
            context,
            stats: MpcExecutionStats::default(),
        }
    }

    /// Underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Accumulated statistics of all circuits run so far.
    pub fn stats(&self) -> MpcExecutionStats {
        self.stats
    }

    /// Execute given async circuit. AND gates issued concurrently are evaluated in a single round.
    pub async fn run_circuit<T, F>(&mut self, circuit: F) -> Result<T, MpcError>
    where
        F: for<'c> FnOnce(&'c MpcExecutionContext) -> LocalBoxFuture<'c, T>,
    {
        let context = &self.context;
        let engine = &mut self.engine;
        let stats = &mut self.stats;

        let mut future = circuit(context);

        let result = loop {
            if let Poll::Ready(output) = futures::poll!(future.as_mut()) {
                break Ok(output);
            }

            let requests = context.and_buffer.take_requests();
            if requests.is_empty() {
                break Err(MpcError::CircuitStalled);
            }

            let num_requests = requests.len();
            stats.num_and_gates += num_requests;
            stats.num_rounds += 1;

            match engine.process_and_gates(requests).await {
                Ok(responses) if responses.len() == num_requests => {
                    context.and_buffer.resolve_all(responses)
                }
                Ok(_) => break Err(MpcError::UnexpectedMessage("AND gates")),
                Err(err) => break Err(err),
            }
        };

        drop(future);
        if result.is_err() {
            context.and_buffer.reset();
        }
        result
    }
}

#[async_trait(?Send)]
impl<E: MpcEngine> SecureEnvironment for MpcExecutor<E> {
    type Wire = BitShare;

    fn party(&self) -> Party {
        self.engine.party()
    }

    async fn share_as_first_party(
        &mut self,
        matrix: &[Vec<bool>],
    ) -> Result<Vec<Vec<BitShare>>, MpcError> {
        self.engine.process_inputs(Party::First, matrix).await
    }

    async fn share_as_second_party(
        &mut self,
        matrix: &[Vec<bool>],
    ) -> Result<Vec<Vec<BitShare>>, MpcError> {
        self.engine.process_inputs(Party::Second, matrix).await
    }

    fn evaluate_xor(&self, a: &[BitShare], b: &[BitShare]) -> Result<Vec<BitShare>, MpcError> {
        circuits::xor_bits(a, b)
    }

    async fn evaluate_oblivious_sort(
        &mut self,
        rows: Vec<Vec<BitShare>>,
        ascending: bool,
    ) -> Result<Vec<Vec<BitShare>>, MpcError> {
        let before = self.stats;
        let sorted = self
            .run_circuit(move |ctx| {
                Box::pin(async move {
                    let mut rows = rows;
                    circuits::sort(ctx, &mut rows, ascending).await?;
                    Ok::<_, MpcError>(rows)
                })
            })
            .await??;
        debug!(
            rows = sorted.len(),
            and_gates = self.stats.num_and_gates - before.num_and_gates,
            rounds = self.stats.num_rounds - before.num_rounds,
            "Oblivious sort finished"
        );
        Ok(sorted)
    }

    async fn reveal_to_first_party(
        &mut self,
        row: &[BitShare],
    ) -> Result<Option<Vec<bool>>, MpcError> {
        self.engine.process_reveal(Party::First, row.to_vec()).await
    }

    async fn reveal_to_second_party(
        &mut self,
        row: &[BitShare],
    ) -> Result<Option<Vec<bool>>, MpcError> {
        self.engine.process_reveal(Party::Second, row.to_vec()).await
    }
}

/// Buffer for accumulating commands issued by async circuit.
struct RoundCommandBuffer<T, S> {
    requests: RefCell<Vec<T>>,
    responses: RefCell<Vec<Option<S>>>,
    round_index: Cell<usize>,
}

impl<T, S> RoundCommandBuffer<T, S> {
    /// Create new instance.
    fn new() -> Self {
        RoundCommandBuffer {
            requests: RefCell::new(Vec::new()),
            responses: RefCell::new(Vec::new()),
            round_index: Cell::new(0),
        }
    }

    /// Queue new command and asynchronously wait for response.
    async fn queue(&self, input: T) -> S {
        let index = {
            let mut requests = self.requests.borrow_mut();
            requests.push(input);
            requests.len() - 1
        };
        let target_round = self.round_index.get() + 1;

        futures::future::poll_fn(|_| {
            if self.round_index.get() == target_round {
                Poll::Ready(
                    self.responses.borrow_mut()[index]
                        .take()
                        .expect("Future polled twice"),
                )
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// Get requests accumulated during last round.
    fn take_requests(&self) -> Vec<T> {
        mem::take(&mut *self.requests.borrow_mut())
    }

    /// Resolve all requests issued during last round.
    fn resolve_all(&self, new_responses: impl IntoIterator<Item = S>) {
        let mut responses = self.responses.borrow_mut();
        responses.clear();
        responses.extend(new_responses.into_iter().map(Some));
        self.round_index.set(self.round_index.get() + 1);
    }

    /// Drop pending state after aborted execution.
    fn reset(&self) {
        self.requests.borrow_mut().clear();
        self.responses.borrow_mut().clear();
        self.round_index.set(self.round_index.get() + 1);
    }
}
