//! Error taxonomy (§7) plus the suspension-point payloads of §4.H.
//!
//! `VMError` is the only error type that leaves the crate's public surface.
//! `Query`/`Choose` are not failures: the driver is contractually obliged to
//! resolve them and resume (§4.H, §5). `InternalError` is reserved for
//! invariant violations that indicate a bug in the interpreter itself — see
//! `SPEC_FULL.md` §4.K.

use crate::expr::Expr;
use crate::primitives::{Address, Bytes, U256};
use thiserror::Error;

/// A request the interpreter cannot resolve on its own (§4.H).
#[derive(Debug, Clone)]
pub enum Query {
    /// Fetch a contract's code/balance/nonce from an external source.
    PleaseFetchContract { address: Address },
    /// Fetch a single concrete storage slot from an external source.
    PleaseFetchSlot { address: Address, slot: U256 },
    /// Ask an SMT solver whether `condition` is satisfiable/falsifiable
    /// given the accumulated path `constraints`.
    PleaseAskSmt {
        condition: Expr,
        path_constraints: Vec<Expr>,
    },
    /// Run an external process (cheatcode `ffi`) and resume with its
    /// stdout.
    PleaseDoFfi { argv: Vec<String> },
}

/// A choice handed back to the user when the SMT solver could not decide
/// (§4.H, `PleaseAskSMT -> Unknown`).
#[derive(Debug, Clone)]
pub enum Choose {
    PleaseChoosePath { condition: Expr },
}

/// Internal invariant violations — never surfaced by themselves, always
/// wrapped as `VMError::Internal`. If one of these is ever constructed, the
/// interpreter's own bookkeeping (not the executed bytecode) is at fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("gas accounting overflowed")]
    GasOverflow,
    #[error("frame stack underflowed")]
    NoActiveFrame,
    #[error("attempted to pop a call frame that was never pushed")]
    FrameStackUnderflow,
    #[error("contract {0:?} missing from the working set")]
    ContractNotLoaded(Address),
    #[error("op-index map missing entry for pc {0}")]
    MissingOpIndex(usize),
    #[error("trace cursor pointed at a node with no parent")]
    TraceCursorUnderflow,
    #[error("arithmetic overflow in accounting that gas limits should have prevented")]
    ArithmeticOverflow,
    #[error("dispatch routed {0:?} to a handler expecting an immediate operand count")]
    BadImmediateDispatch(crate::opcodes::Opcode),
    #[error("a resolve_* entry point was called with no matching suspension pending")]
    NoPendingOp,
}

/// Errors the step function and call/create protocol can raise (§7).
///
/// Every variant terminates the *current frame* via `finishFrame(Errored
/// e))`; the top-level frame turns it into `VMResult::Failure`. `Revert`
/// preserves remaining gas; every other variant burns it (§7 propagation
/// rule).
#[derive(Debug, Clone, Error)]
pub enum VMError {
    #[error("balance too low for value transfer")]
    BalanceTooLow,
    #[error("unrecognized opcode 0x{0:02x}")]
    UnrecognizedOpcode(u8),
    #[error("self-destruction")]
    SelfDestruction,
    #[error("stack underrun")]
    StackUnderrun,
    #[error("bad jump destination")]
    BadJumpDestination,
    #[error("reverted")]
    Revert(Bytes),
    #[error("out of gas (have {have}, need {need})")]
    OutOfGas { have: u64, need: u64 },
    #[error("bad cheatcode selector {selector:?}")]
    BadCheatCode { selector: Option<[u8; 4]> },
    #[error("stack limit exceeded")]
    StackLimitExceeded,
    #[error("illegal overflow")]
    IllegalOverflow,
    /// A suspension, not a true failure (§4.H, §7): the driver resolves it
    /// and clears `VM::result` before stepping again.
    #[error("suspended on query")]
    Query(Box<Query>),
    /// A suspension the SMT solver could not decide on its own.
    #[error("suspended on choice")]
    Choose(Box<Choose>),
    #[error("state change attempted inside a static context")]
    StateChangeWhileStatic,
    #[error("invalid memory access")]
    InvalidMemoryAccess,
    #[error("call depth limit reached")]
    CallDepthLimitReached,
    #[error("max code size exceeded (limit {limit}, got {got})")]
    MaxCodeSizeExceeded { limit: usize, got: usize },
    #[error("invalid code format (EIP-3541 0xEF prefix)")]
    InvalidFormat,
    #[error("precompile execution failed")]
    PrecompileFailure,
    #[error("unexpected symbolic argument at pc {pc}: {msg}")]
    UnexpectedSymbolicArg {
        pc: usize,
        msg: String,
        exprs: Vec<Expr>,
    },
    #[error("dead path (unsatisfiable branch condition)")]
    DeadPath,
    #[error("result was not unique")]
    NotUnique,
    #[error("SMT solver timed out")]
    SmtTimeout,
    #[error("ffi call failed")]
    Ffi(Vec<String>),
    #[error("nonce overflow")]
    NonceOverflow,
    #[error(transparent)]
    Internal(#[from] InternalError),
}

pub type VMResultT<T> = Result<T, VMError>;
