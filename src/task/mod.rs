// Task module - composable process chains
//
// - outcome: chain states, outcomes and failure taxonomy
// - process: process invocation, backends and output interpreters
// - chain: the arena-backed chain graph and its combinators

pub mod chain;
pub mod outcome;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{ChainHandle, Continuation, NodeId, TaskChain};
pub use outcome::{ChainError, ChainState, TaskFailure, TaskOutcome};
pub use process::{
    OutputInterpreter, ProcessBackend, ProcessError, ProcessInvocation, ProcessOutput,
    ProcessTask, TokioProcessBackend,
};
