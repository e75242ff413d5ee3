//! Task chains: composable, cancellable graphs of process tasks and pure steps.
//!
//! A [`TaskChain<T>`] owns an arena of nodes. Every combinator consumes the
//! chain (and any chain passed to it) and appends one node that links to the
//! existing tails, so the graph stays a tree rooted at the newest node and
//! each node's value is consumed by exactly one successor.
//!
//! Node kinds:
//! - source: a process task or a pure computation with no input
//! - continue: maps the single predecessor's result
//! - pair: combines two sub-chains, either run concurrently (fuse) or one
//!   after the other (sequence)
//!
//! Every node carries the cancellation token it was built with and checks
//! it before starting.

use std::any::{type_name, Any};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::outcome::{ChainError, ChainState, TaskFailure, TaskOutcome};
use super::process::ProcessTask;

type AnyValue = Box<dyn Any + Send>;
type AnyResult = Result<AnyValue, TaskFailure>;

type SourceStep = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Terminal> + Send>;
type ContinueStep =
    Box<dyn FnOnce(AnyResult, CancellationToken) -> BoxFuture<'static, Terminal> + Send>;
type PairStep = Box<dyn FnOnce(AnyResult, AnyResult) -> Terminal + Send>;

/// Index of a node inside a chain arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Whether a continuation runs only after success or after any non-cancelled end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    OnSuccess,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairOrder {
    Concurrent,
    Sequential,
}

#[derive(Debug, Clone, Copy)]
enum Links {
    Source,
    Continue {
        input: NodeId,
        mode: Continuation,
    },
    Pair {
        left: NodeId,
        right: NodeId,
        mode: Continuation,
        order: PairOrder,
    },
}

impl Links {
    fn shifted(self, offset: usize) -> Self {
        let shift = |id: NodeId| NodeId(id.0 + offset);
        match self {
            Links::Source => Links::Source,
            Links::Continue { input, mode } => Links::Continue {
                input: shift(input),
                mode,
            },
            Links::Pair {
                left,
                right,
                mode,
                order,
            } => Links::Pair {
                left: shift(left),
                right: shift(right),
                mode,
                order,
            },
        }
    }
}

enum Step {
    Source(SourceStep),
    Continue(ContinueStep),
    Pair(PairStep),
}

/// Type-erased terminal state flowing between nodes.
enum Terminal {
    Succeeded(AnyValue),
    Failed(TaskFailure),
    Cancelled,
}

impl Terminal {
    fn state(&self) -> ChainState {
        match self {
            Terminal::Succeeded(_) => ChainState::Succeeded,
            Terminal::Failed(_) => ChainState::Failed,
            Terminal::Cancelled => ChainState::Cancelled,
        }
    }

    fn from_outcome<T: Send + 'static>(outcome: TaskOutcome<T>) -> Self {
        match outcome {
            TaskOutcome::Succeeded(v) => Terminal::Succeeded(Box::new(v)),
            TaskOutcome::Failed(e) => Terminal::Failed(e),
            TaskOutcome::Cancelled => Terminal::Cancelled,
        }
    }

    fn from_result<T: Send + 'static>(result: Result<T, TaskFailure>) -> Self {
        Self::from_outcome(result.into())
    }

    fn into_outcome<T: 'static>(self) -> TaskOutcome<T> {
        match self {
            Terminal::Succeeded(v) => downcast::<T>(v).into(),
            Terminal::Failed(e) => TaskOutcome::Failed(e),
            Terminal::Cancelled => TaskOutcome::Cancelled,
        }
    }
}

fn downcast<T: 'static>(value: AnyValue) -> Result<T, TaskFailure> {
    value
        .downcast::<T>()
        .map(|v| *v)
        .map_err(|_| TaskFailure::TypeMismatch(type_name::<T>()))
}

struct ChainNode {
    label: &'static str,
    links: Links,
    step: Mutex<Option<Step>>,
    state: Mutex<ChainState>,
    cancel: CancellationToken,
}

/// Arena holding every node of one chain graph.
#[derive(Default)]
struct ChainArena {
    nodes: Vec<ChainNode>,
}

impl ChainArena {
    fn push(
        &mut self,
        label: &'static str,
        links: Links,
        step: Step,
        cancel: CancellationToken,
    ) -> NodeId {
        self.nodes.push(ChainNode {
            label,
            links,
            step: Mutex::new(Some(step)),
            state: Mutex::new(ChainState::Pending),
            cancel,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Move every node of `other` into this arena, returning the id offset.
    fn absorb(&mut self, other: ChainArena) -> usize {
        let offset = self.nodes.len();
        self.nodes.extend(other.nodes.into_iter().map(|mut node| {
            node.links = node.links.shifted(offset);
            node
        }));
        offset
    }

    fn state(&self, id: NodeId) -> ChainState {
        self.nodes[id.0]
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(ChainState::Failed)
    }

    fn transition(&self, id: NodeId, next: ChainState) {
        let node = &self.nodes[id.0];
        let Ok(mut state) = node.state.lock() else {
            return;
        };
        if state.can_transition_to(next) {
            debug!(
                node = id.0,
                label = node.label,
                from = state.as_str(),
                to = next.as_str(),
                "chain node transition"
            );
            *state = next;
        } else {
            warn!(
                node = id.0,
                label = node.label,
                from = state.as_str(),
                to = next.as_str(),
                "ignored backwards chain transition"
            );
        }
    }

    fn take_step(&self, id: NodeId) -> Option<Step> {
        self.nodes[id.0].step.lock().ok().and_then(|mut s| s.take())
    }

    fn finish(&self, id: NodeId, terminal: Terminal) -> Terminal {
        self.transition(id, terminal.state());
        terminal
    }

    /// Resolve a node (and everything below it) that will never run.
    fn skip(&self, id: NodeId, state: ChainState) {
        drop(self.take_step(id));
        if self.state(id) == ChainState::Pending {
            self.transition(id, state);
        }
        match self.nodes[id.0].links {
            Links::Source => {}
            Links::Continue { input, .. } => self.skip(input, state),
            Links::Pair { left, right, .. } => {
                self.skip(left, state);
                self.skip(right, state);
            }
        }
    }

    fn start(&self, id: NodeId) -> Option<Step> {
        let step = self.take_step(id);
        if step.is_some() {
            self.transition(id, ChainState::Running);
        }
        step
    }

    fn consumed(&self, id: NodeId) -> Terminal {
        self.finish(
            id,
            Terminal::Failed(TaskFailure::message(format!(
                "chain node '{}' was already consumed",
                self.nodes[id.0].label
            ))),
        )
    }

    fn execute(&self, id: NodeId) -> BoxFuture<'_, Terminal> {
        Box::pin(async move {
            let node = &self.nodes[id.0];
            match node.links {
                Links::Source => {
                    if node.cancel.is_cancelled() {
                        return self.finish(id, Terminal::Cancelled);
                    }
                    let Some(Step::Source(step)) = self.start(id) else {
                        return self.consumed(id);
                    };
                    let terminal = step(node.cancel.clone()).await;
                    self.finish(id, terminal)
                }
                Links::Continue { input, mode } => {
                    let input = match (self.execute(input).await, mode) {
                        (Terminal::Cancelled, _) => {
                            drop(self.take_step(id));
                            return self.finish(id, Terminal::Cancelled);
                        }
                        (Terminal::Failed(e), Continuation::OnSuccess) => {
                            drop(self.take_step(id));
                            return self.finish(id, Terminal::Failed(e));
                        }
                        (Terminal::Failed(e), Continuation::Always) => Err(e),
                        (Terminal::Succeeded(v), _) => Ok(v),
                    };
                    if node.cancel.is_cancelled() {
                        drop(self.take_step(id));
                        return self.finish(id, Terminal::Cancelled);
                    }
                    let Some(Step::Continue(step)) = self.start(id) else {
                        return self.consumed(id);
                    };
                    let terminal = step(input, node.cancel.clone()).await;
                    self.finish(id, terminal)
                }
                Links::Pair {
                    left,
                    right,
                    mode,
                    order,
                } => {
                    let (left, right) = match order {
                        PairOrder::Concurrent => {
                            tokio::join!(self.execute(left), self.execute(right))
                        }
                        PairOrder::Sequential => match (self.execute(left).await, mode) {
                            (Terminal::Cancelled, _) => {
                                self.skip(right, ChainState::Cancelled);
                                drop(self.take_step(id));
                                return self.finish(id, Terminal::Cancelled);
                            }
                            (Terminal::Failed(e), Continuation::OnSuccess) => {
                                self.skip(right, ChainState::Failed);
                                drop(self.take_step(id));
                                return self.finish(id, Terminal::Failed(e));
                            }
                            (first, _) => {
                                self.transition(id, ChainState::Running);
                                let second = self.execute(right).await;
                                (first, second)
                            }
                        },
                    };

                    let (left, right) = match (left, right, mode) {
                        (Terminal::Cancelled, _, _) | (_, Terminal::Cancelled, _) => {
                            drop(self.take_step(id));
                            return self.finish(id, Terminal::Cancelled);
                        }
                        (Terminal::Failed(e), _, Continuation::OnSuccess)
                        | (_, Terminal::Failed(e), Continuation::OnSuccess) => {
                            drop(self.take_step(id));
                            return self.finish(id, Terminal::Failed(e));
                        }
                        (l, r, _) => (into_result(l), into_result(r)),
                    };
                    if node.cancel.is_cancelled() {
                        drop(self.take_step(id));
                        return self.finish(id, Terminal::Cancelled);
                    }
                    let step = match self.take_step(id) {
                        Some(Step::Pair(step)) => step,
                        _ => return self.consumed(id),
                    };
                    if self.state(id) == ChainState::Pending {
                        self.transition(id, ChainState::Running);
                    }
                    let terminal = step(left, right);
                    self.finish(id, terminal)
                }
            }
        })
    }
}

fn into_result(terminal: Terminal) -> AnyResult {
    match terminal {
        Terminal::Succeeded(v) => Ok(v),
        Terminal::Failed(e) => Err(e),
        // Filtered out before the pair step runs.
        Terminal::Cancelled => Err(TaskFailure::message("cancelled")),
    }
}

/// A typed handle over a chain graph producing `T`.
pub struct TaskChain<T> {
    id: Uuid,
    arena: ChainArena,
    tail: NodeId,
    cancel: CancellationToken,
    started: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> TaskChain<T> {
    fn source(label: &'static str, cancel: CancellationToken, step: SourceStep) -> Self {
        let mut arena = ChainArena::default();
        let tail = arena.push(label, Links::Source, Step::Source(step), cancel.clone());
        Self {
            id: Uuid::now_v7(),
            arena,
            tail,
            cancel,
            started: false,
            _marker: PhantomData,
        }
    }

    fn retype<U>(self, tail: NodeId) -> TaskChain<U> {
        TaskChain {
            id: self.id,
            arena: self.arena,
            tail,
            cancel: self.cancel,
            started: self.started,
            _marker: PhantomData,
        }
    }

    /// A chain whose single node runs one external process.
    pub fn from_process(task: ProcessTask<T>, cancel: CancellationToken) -> Self {
        Self::source(
            "process",
            cancel,
            Box::new(move |token| {
                Box::pin(async move { Terminal::from_outcome(task.run(token).await) })
            }),
        )
    }

    /// A chain that immediately succeeds with `value`.
    pub fn ready(value: T, cancel: CancellationToken) -> Self {
        Self::from_fn(cancel, move || Ok(value))
    }

    /// A chain running a pure computation.
    pub fn from_fn<F>(cancel: CancellationToken, f: F) -> Self
    where
        F: FnOnce() -> Result<T, TaskFailure> + Send + 'static,
    {
        Self::source(
            "compute",
            cancel,
            Box::new(move |_| Box::pin(async move { Terminal::from_result(f()) })),
        )
    }

    /// A chain awaiting an arbitrary future, such as a file read.
    pub fn from_future<Fut>(cancel: CancellationToken, fut: Fut) -> Self
    where
        Fut: Future<Output = Result<T, TaskFailure>> + Send + 'static,
    {
        Self::source(
            "future",
            cancel,
            Box::new(move |token| {
                Box::pin(async move {
                    tokio::select! {
                        result = fut => Terminal::from_result(result),
                        _ = token.cancelled() => Terminal::Cancelled,
                    }
                })
            }),
        )
    }

    fn continue_with<U>(
        mut self,
        label: &'static str,
        mode: Continuation,
        step: ContinueStep,
    ) -> TaskChain<U> {
        let input = self.tail;
        let tail = self.arena.push(
            label,
            Links::Continue { input, mode },
            Step::Continue(step),
            self.cancel.clone(),
        );
        self.retype(tail)
    }

    fn pair_with<U, R>(
        mut self,
        other: TaskChain<U>,
        label: &'static str,
        mode: Continuation,
        order: PairOrder,
        step: PairStep,
    ) -> TaskChain<R> {
        let left = self.tail;
        let started = self.started || other.started;
        let offset = self.arena.absorb(other.arena);
        let right = NodeId(other.tail.0 + offset);
        let tail = self.arena.push(
            label,
            Links::Pair {
                left,
                right,
                mode,
                order,
            },
            Step::Pair(step),
            self.cancel.clone(),
        );
        self.started = started;
        self.retype(tail)
    }

    /// Continue with `f` only if this chain succeeds.
    pub fn then<U, F>(self, f: F) -> TaskChain<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, TaskFailure> + Send + 'static,
    {
        self.continue_with(
            "then",
            Continuation::OnSuccess,
            Box::new(move |input, _| {
                Box::pin(async move {
                    Terminal::from_result(input.and_then(downcast::<T>).and_then(f))
                })
            }),
        )
    }

    /// Continue with `f` whether this chain succeeded or failed.
    ///
    /// `f` is not invoked when the chain is cancelled.
    pub fn then_always<U, F>(self, f: F) -> TaskChain<U>
    where
        U: Send + 'static,
        F: FnOnce(Result<T, TaskFailure>) -> Result<U, TaskFailure> + Send + 'static,
    {
        self.continue_with(
            "then_always",
            Continuation::Always,
            Box::new(move |input, _| {
                Box::pin(async move { Terminal::from_result(f(input.and_then(downcast::<T>))) })
            }),
        )
    }

    /// Continue with a chain built from this chain's value; the nested chain
    /// runs inline.
    pub fn and_then<U, F>(self, f: F) -> TaskChain<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> TaskChain<U> + Send + 'static,
    {
        self.continue_with(
            "and_then",
            Continuation::OnSuccess,
            Box::new(move |input, cancel| {
                Box::pin(async move {
                    let value = match input.and_then(downcast::<T>) {
                        Ok(v) => v,
                        Err(e) => return Terminal::Failed(e),
                    };
                    let mut next = f(value);
                    let nested = next.tokens();
                    let run = next.run();
                    tokio::pin!(run);
                    let result = tokio::select! {
                        result = &mut run => result,
                        _ = cancel.cancelled() => {
                            for token in &nested {
                                token.cancel();
                            }
                            run.await
                        }
                    };
                    match result {
                        Ok(outcome) => Terminal::from_outcome(outcome),
                        Err(e) => Terminal::Failed(TaskFailure::message(e.to_string())),
                    }
                })
            }),
        )
    }

    /// Run `next` after this chain succeeds; the result is `next`'s.
    pub fn then_chain<U: Send + 'static>(self, next: TaskChain<U>) -> TaskChain<U> {
        self.pair_with(
            next,
            "then_chain",
            Continuation::OnSuccess,
            PairOrder::Sequential,
            Box::new(|_, second| match second {
                Ok(v) => Terminal::Succeeded(v),
                Err(e) => Terminal::Failed(e),
            }),
        )
    }

    /// Run `next` after this chain ends, even if it failed.
    pub fn then_chain_always<U: Send + 'static>(self, next: TaskChain<U>) -> TaskChain<U> {
        self.pair_with(
            next,
            "then_chain_always",
            Continuation::Always,
            PairOrder::Sequential,
            Box::new(|_, second| match second {
                Ok(v) => Terminal::Succeeded(v),
                Err(e) => Terminal::Failed(e),
            }),
        )
    }

    /// Run both chains concurrently and combine their values once both succeed.
    pub fn join<U, R, F>(self, other: TaskChain<U>, f: F) -> TaskChain<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: FnOnce(T, U) -> R + Send + 'static,
    {
        self.pair_with(
            other,
            "join",
            Continuation::OnSuccess,
            PairOrder::Concurrent,
            Box::new(move |left, right| {
                let pair = left
                    .and_then(downcast::<T>)
                    .and_then(|a| right.and_then(downcast::<U>).map(|b| (a, b)));
                Terminal::from_result(pair.map(|(a, b)| f(a, b)))
            }),
        )
    }

    /// Run both chains concurrently and always combine their results.
    ///
    /// Cancellation of either side still cancels the join.
    pub fn join_always<U, R, F>(self, other: TaskChain<U>, f: F) -> TaskChain<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: FnOnce(Result<T, TaskFailure>, Result<U, TaskFailure>) -> Result<R, TaskFailure>
            + Send
            + 'static,
    {
        self.pair_with(
            other,
            "join_always",
            Continuation::Always,
            PairOrder::Concurrent,
            Box::new(move |left, right| {
                Terminal::from_result(f(
                    left.and_then(downcast::<T>),
                    right.and_then(downcast::<U>),
                ))
            }),
        )
    }

    /// Split `items` into batches and run one process per batch, in order.
    ///
    /// A failed batch stops the remaining ones. An empty input succeeds
    /// without spawning anything.
    pub fn batched<F>(
        items: &[String],
        batch_size: usize,
        cancel: CancellationToken,
        mut make_task: F,
    ) -> TaskChain<Vec<T>>
    where
        F: FnMut(&[String]) -> ProcessTask<T>,
    {
        let mut batches = items.chunks(batch_size.max(1));
        let Some(first) = batches.next() else {
            return TaskChain::ready(Vec::new(), cancel);
        };

        let mut chain =
            TaskChain::from_process(make_task(first), cancel.clone()).then(|v| Ok(vec![v]));
        for batch in batches {
            let next = TaskChain::from_process(make_task(batch), cancel.clone());
            chain = chain.pair_with(
                next,
                "batch",
                Continuation::OnSuccess,
                PairOrder::Sequential,
                Box::new(|acc, value| {
                    let merged = acc.and_then(downcast::<Vec<T>>).and_then(|mut acc| {
                        value.and_then(downcast::<T>).map(|v| {
                            acc.push(v);
                            acc
                        })
                    });
                    Terminal::from_result(merged)
                }),
            );
        }
        chain
    }

    /// Execute the chain. May only be called once.
    pub async fn run(&mut self) -> Result<TaskOutcome<T>, ChainError> {
        if self.started {
            return Err(ChainError::AlreadyStarted);
        }
        self.started = true;
        debug!(chain = %self.id, nodes = self.arena.nodes.len(), "running chain");
        let terminal = self.arena.execute(self.tail).await;
        debug!(chain = %self.id, state = terminal.state().as_str(), "chain finished");
        Ok(terminal.into_outcome())
    }

    /// Spawn the chain onto the tokio runtime.
    ///
    /// The handle cancels every token referenced by the chain's nodes, so
    /// sides built on other tokens stop too.
    pub fn start(self) -> ChainHandle<T> {
        let tokens = self.tokens();
        let mut chain = self;
        let join = tokio::spawn(async move { chain.run().await });
        ChainHandle { join, tokens }
    }
}

impl<T> TaskChain<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every token referenced by this chain's nodes.
    pub fn cancel(&self) {
        for token in self.tokens() {
            token.cancel();
        }
    }

    /// Cancellation tokens referenced by this chain's nodes, one per node.
    fn tokens(&self) -> Vec<CancellationToken> {
        self.arena.nodes.iter().map(|node| node.cancel.clone()).collect()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// State of the final node.
    pub fn state(&self) -> ChainState {
        self.arena.state(self.tail)
    }

    /// States of every node, in construction order.
    pub fn node_states(&self) -> Vec<ChainState> {
        (0..self.arena.nodes.len())
            .map(|i| self.arena.state(NodeId(i)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.arena.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.nodes.is_empty()
    }
}

impl<T> std::fmt::Debug for TaskChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskChain")
            .field("id", &self.id)
            .field("nodes", &self.arena.nodes.len())
            .field("started", &self.started)
            .finish()
    }
}

/// Handle to a chain running on the tokio runtime.
pub struct ChainHandle<T> {
    join: JoinHandle<Result<TaskOutcome<T>, ChainError>>,
    tokens: Vec<CancellationToken>,
}

impl<T> ChainHandle<T> {
    pub fn cancel(&self) {
        for token in &self.tokens {
            token.cancel();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> Result<TaskOutcome<T>, ChainError> {
        self.join.await?
    }
}
