//! Call/create frame state (§3 "Frame", "FrameState", "FrameContext").
//!
//! One `Frame` exists per nested `CALL`/`CALLCODE`/`DELEGATECALL`/
//! `STATICCALL`/`CREATE`/`CREATE2`, pushed and popped by the driver loop
//! in `vm.rs`. Grounded on the `CallFrame`/`generic_call`/`create` split
//! seen in the `levm` forks under `examples/other_examples/`.

use crate::contract::Contract;
use crate::environment::Env;
use crate::expr::{Buf, Expr};
use crate::primitives::{Address, Bytes, U256};
use std::sync::Arc;

/// Why this frame exists: a top-level/nested message call, or a contract
/// creation (§3 "FrameContext").
#[derive(Debug, Clone)]
pub enum FrameContext {
    Call {
        code_address: Address,
        calldata: Buf,
    },
    Creation {
        /// `None` for `CREATE`; `Some(salt)` for `CREATE2` (§4.F).
        salt: Option<U256>,
    },
}

/// A call/create frame's mutable execution state (§3 "FrameState").
#[derive(Debug, Clone)]
pub struct FrameState {
    pub pc: usize,
    pub stack: Vec<Expr>,
    pub memory: Buf,
    /// Highest memory word index touched so far, for the quadratic
    /// expansion-cost formula (§4.B).
    pub memory_word_size: u64,
    /// Gas this frame started with, so `gas_used = gas_limit -
    /// gas_remaining` can be computed once the frame finishes.
    pub gas_limit: u64,
    pub gas_remaining: u64,
    pub return_data: Buf,
    /// Freshly appended `LOGn` records this frame has emitted, in order
    /// (§4.E `LOGn`). Discarded entirely if the frame reverts.
    pub logs: Vec<LogEntry>,
}

impl FrameState {
    pub fn new(gas_remaining: u64) -> FrameState {
        FrameState {
            pc: 0,
            stack: Vec::new(),
            memory: Buf::Concrete(Bytes::new()),
            memory_word_size: 0,
            gas_limit: gas_remaining,
            gas_remaining,
            return_data: Buf::Concrete(Bytes::new()),
            logs: Vec::new(),
        }
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_limit.saturating_sub(self.gas_remaining)
    }
}

/// One `LOGn` record (§4.E).
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<Expr>,
    pub data: Buf,
}

/// A single stack frame of the call/create nesting (§3 "Frame").
#[derive(Debug, Clone)]
pub struct Frame {
    pub context: FrameContext,
    pub contract: Arc<Contract>,
    pub this: Address,
    pub caller: Address,
    pub call_value: Expr,
    pub is_static: bool,
    /// Depth of this frame in the call stack; the top-level frame is 0
    /// (§4.A invariant: depth never exceeds `CALL_DEPTH_LIMIT`).
    pub depth: usize,
    pub state: FrameState,
}

impl Frame {
    pub fn top_level(
        env: &Env,
        this: Address,
        caller: Address,
        contract: Arc<Contract>,
        calldata: Buf,
        call_value: Expr,
        gas_limit: u64,
        is_static: bool,
    ) -> Frame {
        let _ = env;
        Frame {
            context: FrameContext::Call {
                code_address: this,
                calldata,
            },
            contract,
            this,
            caller,
            call_value,
            is_static,
            depth: 0,
            state: FrameState::new(gas_limit),
        }
    }

    /// `caller` is passed in rather than always taken from `parent.this`
    /// since `DELEGATECALL` must report the *inherited* caller (the
    /// grandparent's `msg.sender`), not the immediate calling contract
    /// (§4.F) — see `opcode_handlers/system.rs`'s `caller_override`.
    pub fn child_call(
        parent: &Frame,
        this: Address,
        caller: Address,
        code_address: Address,
        contract: Arc<Contract>,
        calldata: Buf,
        call_value: Expr,
        gas_limit: u64,
        is_static: bool,
    ) -> Frame {
        Frame {
            context: FrameContext::Call {
                code_address,
                calldata,
            },
            contract,
            this,
            caller,
            call_value,
            is_static,
            depth: parent.depth + 1,
            state: FrameState::new(gas_limit),
        }
    }

    pub fn child_creation(
        parent: &Frame,
        this: Address,
        contract: Arc<Contract>,
        call_value: Expr,
        gas_limit: u64,
        salt: Option<U256>,
    ) -> Frame {
        Frame {
            context: FrameContext::Creation { salt },
            contract,
            this,
            caller: parent.this,
            call_value,
            is_static: parent.is_static,
            depth: parent.depth + 1,
            state: FrameState::new(gas_limit),
        }
    }

    pub fn calldata(&self) -> Option<&Buf> {
        match &self.context {
            FrameContext::Call { calldata, .. } => Some(calldata),
            FrameContext::Creation { .. } => None,
        }
    }
}
