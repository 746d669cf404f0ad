//! Per-opcode step logic (§4.E "step function"), dispatched by
//! [`dispatch`] from [`crate::vm::VM::step`].
//!
//! Grounded on the per-opcode-method style of the modern `levm` forks
//! (`op_add`, `op_call`, ...) seen in
//! `examples/other_examples/9d1020ce_cypherpepe-ethrex__...system.rs.rs`:
//! one method per opcode (or tight family of opcodes), each responsible
//! for its own gas charge, stack effect, and PC advance.

mod arithmetic;
mod bitwise;
mod comparison;
mod environment;
mod log;
mod stack_memory_storage_flow;
mod system;

use crate::errors::{VMError, VMResultT};
use crate::expr::{Buf, Expr};
use crate::opcodes::Opcode;
use crate::vm::VM;

pub(crate) use stack_memory_storage_flow::{peek_jumpi_cond, resolve_jumpi};

/// What a single `dispatch` call did to the current frame.
pub enum StepOutcome {
    /// The opcode ran normally; the frame is still executing.
    Continue,
    /// `STOP`/`RETURN`/`SELFDESTRUCT` (or falling off the end of code):
    /// the frame halts successfully with `output`.
    Halt(Buf),
    /// `REVERT`: the frame halts, undoing its own state changes, with
    /// `output` as revert data.
    Revert(Buf),
}

pub fn dispatch(vm: &mut VM, opcode: Opcode) -> VMResultT<StepOutcome> {
    use Opcode::*;
    match opcode {
        Stop => {
            return Ok(StepOutcome::Halt(Buf::Concrete(crate::primitives::Bytes::new())));
        }
        Add | Mul | Sub | Div | SDiv | Mod | SMod | AddMod | MulMod | Exp | SignExtend => {
            arithmetic::step(vm, opcode)?;
        }
        Lt | Gt | SLt | SGt | Eq | IsZero => {
            comparison::step(vm, opcode)?;
        }
        And | Or | Xor | Not | Byte | Shl | Shr | Sar => {
            bitwise::step(vm, opcode)?;
        }
        Sha3 => {
            stack_memory_storage_flow::op_sha3(vm)?;
        }
        Address | Balance | Origin | Caller | CallValue | CallDataLoad | CallDataSize
        | CallDataCopy | CodeSize | CodeCopy | GasPrice | ExtCodeSize | ExtCodeCopy
        | ReturnDataSize | ReturnDataCopy | ExtCodeHash | BlockHash | Coinbase | Timestamp
        | Number | PrevRandao | GasLimit | ChainId | SelfBalance | BaseFee => {
            environment::step(vm, opcode)?;
        }
        Pop => {
            pop(vm)?;
            advance(vm, opcode);
        }
        MLoad | MStore | MStore8 | SLoad | SStore | MSize | Gas | PC | JumpDest | TLoad
        | TStore | MCopy => {
            stack_memory_storage_flow::step(vm, opcode)?;
        }
        Jump | JumpI => {
            return stack_memory_storage_flow::op_jump(vm, opcode).map(|()| StepOutcome::Continue);
        }
        Push0 => {
            push(vm, Expr::lit(crate::primitives::U256::zero()))?;
            advance(vm, opcode);
        }
        Push1 | Push2 | Push3 | Push4 | Push5 | Push6 | Push7 | Push8 | Push9 | Push10
        | Push11 | Push12 | Push13 | Push14 | Push15 | Push16 | Push17 | Push18 | Push19
        | Push20 | Push21 | Push22 | Push23 | Push24 | Push25 | Push26 | Push27 | Push28
        | Push29 | Push30 | Push31 | Push32 => {
            stack_memory_storage_flow::op_push(vm, opcode)?;
        }
        Dup1 | Dup2 | Dup3 | Dup4 | Dup5 | Dup6 | Dup7 | Dup8 | Dup9 | Dup10 | Dup11 | Dup12
        | Dup13 | Dup14 | Dup15 | Dup16 => {
            stack_memory_storage_flow::op_dup(vm, opcode)?;
        }
        Swap1 | Swap2 | Swap3 | Swap4 | Swap5 | Swap6 | Swap7 | Swap8 | Swap9 | Swap10
        | Swap11 | Swap12 | Swap13 | Swap14 | Swap15 | Swap16 => {
            stack_memory_storage_flow::op_swap(vm, opcode)?;
        }
        Log0 | Log1 | Log2 | Log3 | Log4 => {
            log::step(vm, opcode)?;
        }
        Create | Create2 => {
            return system::op_create(vm, opcode);
        }
        Call | CallCode | DelegateCall | StaticCall => {
            return system::op_call(vm, opcode);
        }
        Return => {
            return system::op_return(vm);
        }
        Revert => {
            return system::op_revert(vm);
        }
        Invalid => {
            return Err(VMError::UnrecognizedOpcode(Invalid.as_byte()));
        }
        SelfDestruct => {
            return system::op_selfdestruct(vm);
        }
    }
    Ok(StepOutcome::Continue)
}

/// Advance `pc` by this opcode's on-wire size (1, or `n+1` for `PUSHn`).
/// Handlers that branch (`JUMP`/`JUMPI`) set `pc` themselves and must not
/// call this.
pub(super) fn advance(vm: &mut VM, opcode: Opcode) {
    vm.frame_mut().state.pc += opcode.op_size();
}

pub(super) fn charge_gas(vm: &mut VM, amount: u64) -> VMResultT<()> {
    crate::gas::charge(&mut vm.frame_mut().state.gas_remaining, amount)
}

pub(super) fn push(vm: &mut VM, value: Expr) -> VMResultT<()> {
    let stack = &mut vm.frame_mut().state.stack;
    if stack.len() >= crate::constants::STACK_LIMIT {
        return Err(VMError::StackLimitExceeded);
    }
    stack.push(value);
    Ok(())
}

pub(super) fn pop(vm: &mut VM) -> VMResultT<Expr> {
    vm.frame_mut()
        .state
        .stack
        .pop()
        .ok_or(VMError::StackUnderrun)
}

pub(super) fn peek(vm: &VM, depth_from_top: usize) -> VMResultT<Expr> {
    let stack = &vm.frame().state.stack;
    let len = stack.len();
    if depth_from_top >= len {
        return Err(VMError::StackUnderrun);
    }
    Ok(stack[len - 1 - depth_from_top].clone())
}

pub(super) fn swap_top(vm: &mut VM, depth_from_top: usize) -> VMResultT<()> {
    let stack = &mut vm.frame_mut().state.stack;
    let len = stack.len();
    if depth_from_top >= len {
        return Err(VMError::StackUnderrun);
    }
    stack.swap(len - 1, len - 1 - depth_from_top);
    Ok(())
}

/// Ensure memory covers `offset..offset+size`, charging the quadratic
/// expansion cost incurred (§4.B), and return the (possibly unchanged)
/// word count.
pub(super) fn charge_memory_expansion(vm: &mut VM, offset: u64, size: u64) -> VMResultT<()> {
    let frame = vm.frame_mut();
    let before = frame.state.memory_word_size;
    let after = crate::gas::new_memory_word_size(offset, size, before);
    if after > before {
        let cost = crate::gas::memory_expansion_cost(&vm.config.fee_schedule, before, after);
        charge_gas(vm, cost)?;
        vm.frame_mut().state.memory_word_size = after;
    }
    Ok(())
}

pub(super) fn require_not_static(vm: &VM) -> VMResultT<()> {
    if vm.frame().is_static {
        Err(VMError::StateChangeWhileStatic)
    } else {
        Ok(())
    }
}

/// Convert a stack value to a concrete byte offset/size, suspending
/// (§4.H) rather than guessing when it is symbolic.
pub(super) fn concrete_usize(value: &Expr) -> VMResultT<usize> {
    let word = crate::branch::force_concrete(value)?;
    usize::try_from(word).map_err(|_| VMError::InvalidMemoryAccess)
}
