//! Stack/memory/storage/control-flow opcodes (§4.E): `POP`, `MLOAD`,
//! `MSTORE`, `MSTORE8`, `SLOAD`, `SSTORE`, `JUMP`, `JUMPI`, `PC`, `MSIZE`,
//! `GAS`, `JUMPDEST`, `TLOAD`, `TSTORE`, `MCOPY`, `PUSHn`, `DUPn`,
//! `SWAPn`, `SHA3`.

use super::{advance, charge_gas, charge_memory_expansion, concrete_usize, peek, pop, push, swap_top};
use crate::errors::VMResultT;
use crate::expr::{ops, Expr};
use crate::opcodes::Opcode;
use crate::primitives::U256;
use crate::vm::VM;

pub fn step(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    use Opcode::*;
    match opcode {
        MLoad => {
            charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
            let offset = pop(vm)?;
            let off = concrete_usize(&offset)?;
            charge_memory_expansion(vm, off as u64, 32)?;
            let word = ops::read_word(U256::from(off), &vm.frame().state.memory);
            push(vm, word)?;
        }
        MStore => {
            charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
            let offset = pop(vm)?;
            let value = pop(vm)?;
            let off = concrete_usize(&offset)?;
            charge_memory_expansion(vm, off as u64, 32)?;
            let frame = vm.frame_mut();
            frame.state.memory = ops::write_word(offset, value, frame.state.memory.clone());
        }
        MStore8 => {
            charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
            let offset = pop(vm)?;
            let value = pop(vm)?;
            let off = concrete_usize(&offset)?;
            charge_memory_expansion(vm, off as u64, 1)?;
            let frame = vm.frame_mut();
            frame.state.memory = ops::write_byte(offset, value, frame.state.memory.clone());
        }
        SLoad => {
            let slot = peek(vm, 0)?;
            let slot_lit = crate::branch::force_concrete(&slot)?;
            let addr = vm.frame().this;
            pop(vm)?;
            let is_cold = vm.is_storage_key_cold(addr, slot_lit);
            charge_gas(vm, crate::gas::sload_cost(&vm.config.fee_schedule, is_cold))?;
            let value = vm.storage_load(addr, slot_lit);
            push(vm, Expr::lit(value))?;
        }
        SStore => {
            super::require_not_static(vm)?;
            let slot = peek(vm, 0)?;
            let slot_lit = crate::branch::force_concrete(&slot)?;
            let addr = vm.frame().this;
            pop(vm)?;
            let value = pop(vm)?;
            let is_cold = vm.is_storage_key_cold(addr, slot_lit);
            match value.as_lit() {
                Some(value_lit) => {
                    let current = vm.storage_load(addr, slot_lit);
                    let original = vm.original_storage(addr, slot_lit);
                    let (cost, refund_delta) = crate::gas::sstore_cost_and_refund(
                        &vm.config.fee_schedule,
                        is_cold,
                        current,
                        original,
                        value_lit,
                    );
                    charge_gas(vm, cost)?;
                    crate::gas::apply_refund(&mut vm.substate.refund_counter, refund_delta)?;
                    vm.storage_store(addr, slot_lit, value_lit);
                }
                None => {
                    // §9 design note: a symbolic store value can't be priced
                    // against the literal (original, current, new) table, so
                    // charge the conservative flat cost and leave the refund
                    // counter untouched rather than forcing it concrete.
                    let cold_surcharge = if is_cold {
                        vm.config.fee_schedule.g_cold_sload
                    } else {
                        0
                    };
                    charge_gas(vm, vm.config.fee_schedule.g_sset + cold_surcharge)?;
                }
            }
        }
        Jump | JumpI => unreachable!("JUMP/JUMPI are routed through op_jump"),
        PC => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let pc = vm.frame().state.pc;
            push(vm, Expr::lit(U256::from(pc)))?;
        }
        MSize => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let words = vm.frame().state.memory_word_size;
            push(vm, Expr::lit(U256::from(words * 32)))?;
        }
        Gas => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let remaining = vm.frame().state.gas_remaining;
            push(vm, Expr::lit(U256::from(remaining)))?;
        }
        JumpDest => {
            charge_gas(vm, vm.config.fee_schedule.g_jumpdest)?;
        }
        TLoad => {
            // Transient storage (EIP-1153) is out of the symbolic storage
            // model's scope; treated as always-zero, matching a freshly
            // deployed chain with no prior transient writes.
            charge_gas(vm, vm.config.fee_schedule.g_warm_storage_read)?;
            let _slot = pop(vm)?;
            push(vm, Expr::lit(U256::zero()))?;
        }
        TStore => {
            super::require_not_static(vm)?;
            charge_gas(vm, vm.config.fee_schedule.g_warm_storage_read)?;
            let _slot = pop(vm)?;
            let _value = pop(vm)?;
        }
        MCopy => {
            charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
            let dest_offset = pop(vm)?;
            let offset = pop(vm)?;
            let size = pop(vm)?;
            let size_usize = concrete_usize(&size)?;
            charge_gas(vm, crate::gas::copy_cost(&vm.config.fee_schedule, size_usize as u64, 3))?;
            let dest_off = concrete_usize(&dest_offset)?;
            let src_off = concrete_usize(&offset)?;
            charge_memory_expansion(vm, dest_off.max(src_off) as u64, size_usize as u64)?;
            let frame = vm.frame_mut();
            let memory = frame.state.memory.clone();
            frame.state.memory = ops::copy_slice(dest_offset, offset, size, memory.clone(), memory);
        }
        _ => unreachable!("dispatch only routes stack/memory/storage opcodes here"),
    }
    advance(vm, opcode);
    Ok(())
}

/// `JUMP`/`JUMPI`: validated against the contract's precomputed
/// jump-destination set (§4.E "bad jump destination"). Sets `pc`
/// directly rather than calling `advance`.
///
/// `JUMPI`'s condition peeks `dest`/`cond` instead of popping them: if
/// `decide` can't resolve a symbolic condition, the opcode suspends
/// (§4.H `Query::PleaseAskSmt`) with both operands still on the stack,
/// so a naive re-dispatch of `JUMPI` would see the same two values again
/// rather than corrupting the stack. The actual pop only happens once a
/// verdict is known, in [`finish_jump`] — reached either synchronously
/// below or later via [`resolve_jumpi`].
pub fn op_jump(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    charge_gas(vm, if opcode == Opcode::Jump {
        vm.config.fee_schedule.g_mid
    } else {
        vm.config.fee_schedule.g_high
    })?;

    if opcode == Opcode::JumpI {
        let cond = peek(vm, 1)?;
        let take = match crate::branch::decide(&cond) {
            Some(b) => b,
            None => {
                vm.pending_op = Some(crate::vm::PendingOp::AwaitingJumpIVerdict);
                return Err(crate::branch::suspend(cond, Vec::new()));
            }
        };
        finish_jump(vm, take, opcode)
    } else {
        finish_jump(vm, true, opcode)
    }
}

/// Pops `dest` (and, for `JUMPI`, `cond`) for real and either sets `pc`
/// or falls through to the next instruction. `take` must already be
/// known — callers never call `decide` here.
fn finish_jump(vm: &mut VM, take: bool, opcode: Opcode) -> VMResultT<()> {
    let dest = pop(vm)?;
    if opcode == Opcode::JumpI {
        pop(vm)?;
    }

    if !take {
        advance(vm, opcode);
        return Ok(());
    }

    let dest_lit = crate::branch::force_concrete(&dest)?;
    let dest_pc = usize::try_from(dest_lit).map_err(|_| crate::errors::VMError::BadJumpDestination)?;
    if !vm.frame().contract.is_valid_jump_dest(dest_pc) {
        return Err(crate::errors::VMError::BadJumpDestination);
    }
    vm.frame_mut().state.pc = dest_pc;
    Ok(())
}

/// Resume entry point for a `JUMPI` suspended on its condition (§4.H):
/// the driver has already turned its SMT/choice answer into a concrete
/// `take`, so this bypasses `decide` entirely and pops the two operands
/// that were left parked on the stack by [`op_jump`].
pub(crate) fn resolve_jumpi(vm: &mut VM, take: bool) -> VMResultT<()> {
    finish_jump(vm, take, Opcode::JumpI)
}

pub(crate) fn peek_jumpi_cond(vm: &VM) -> VMResultT<Expr> {
    peek(vm, 1)
}

pub fn op_push(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
    let n = opcode
        .immediate_n()
        .ok_or(crate::errors::InternalError::BadImmediateDispatch(opcode))?;
    let pc = vm.frame().state.pc;
    let value = vm.frame().contract.push_immediate(pc, n);
    push(vm, Expr::lit(value))?;
    advance(vm, opcode);
    Ok(())
}

pub fn op_dup(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
    let n = opcode
        .immediate_n()
        .ok_or(crate::errors::InternalError::BadImmediateDispatch(opcode))?;
    let value = peek(vm, n - 1)?;
    push(vm, value)?;
    advance(vm, opcode);
    Ok(())
}

pub fn op_swap(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
    let n = opcode
        .immediate_n()
        .ok_or(crate::errors::InternalError::BadImmediateDispatch(opcode))?;
    swap_top(vm, n)?;
    advance(vm, opcode);
    Ok(())
}

pub fn op_sha3(vm: &mut VM) -> VMResultT<()> {
    let offset = pop(vm)?;
    let size = pop(vm)?;
    let size_usize = concrete_usize(&size)?;
    charge_gas(vm, crate::gas::sha3_cost(&vm.config.fee_schedule, size_usize as u64))?;
    let off = concrete_usize(&offset)?;
    charge_memory_expansion(vm, off as u64, size_usize as u64)?;

    let memory = vm.frame().state.memory.clone();
    let slice_buf = ops::copy_slice(
        Expr::lit(U256::zero()),
        offset,
        size,
        memory,
        crate::expr::Buf::Concrete(crate::primitives::Bytes::new()),
    );
    let digest = ops::keccak(slice_buf.clone());
    if let (Some(bytes), Some(digest_lit)) = (ops::to_list(&slice_buf), digest.as_lit()) {
        vm.tx.record_preimage(digest_lit, bytes);
    }
    push(vm, digest)?;
    advance(vm, Opcode::Sha3);
    Ok(())
}
