//! `CREATE`, `CALL` family, `RETURN`, `REVERT`, `SELFDESTRUCT` (§4.F).
//!
//! Grounded on `op_call`/`op_callcode`/`op_delegatecall`/`op_return` in
//! `examples/other_examples/9d1020ce_cypherpepe-ethrex__...system.rs.rs`.

use super::{advance, charge_gas, charge_memory_expansion, concrete_usize, peek, pop, push, StepOutcome};
use crate::errors::VMResultT;
use crate::expr::{ops, Buf, Expr};
use crate::opcodes::Opcode;
use crate::primitives::{word_to_address, U256};
use crate::vm::VM;

pub fn op_create(vm: &mut VM, opcode: Opcode) -> VMResultT<StepOutcome> {
    super::require_not_static(vm)?;
    // The sender is always the current frame's own address, which is
    // already resident by the time any opcode in this frame runs — this
    // can never actually suspend, but keeps `ensure_account_loaded`'s
    // contract honest rather than assuming it.
    vm.ensure_account_loaded(vm.frame().this)?;

    let value = pop(vm)?;
    let offset = pop(vm)?;
    let size = pop(vm)?;
    let salt = if opcode == Opcode::Create2 {
        Some(pop(vm)?)
    } else {
        None
    };

    let size_usize = concrete_usize(&size)?;
    let off = concrete_usize(&offset)?;
    charge_gas(vm, crate::gas::create_cost(&vm.config.fee_schedule, size_usize as u64, salt.is_some()))?;
    charge_memory_expansion(vm, off as u64, size_usize as u64)?;

    let memory = vm.frame().state.memory.clone();
    let init_code_buf = ops::copy_slice(
        Expr::lit(U256::zero()),
        offset,
        size,
        memory,
        Buf::Concrete(crate::primitives::Bytes::new()),
    );
    let init_code = crate::branch::force_concrete_bytes(&init_code_buf)?;

    let value_lit = crate::branch::force_concrete(&value)?;
    let salt_lit = match &salt {
        Some(s) => Some(crate::branch::force_concrete(s)?),
        None => None,
    };

    let remaining = vm.frame().state.gas_remaining;
    let forwarded = crate::gas::all_but_one_64th(remaining);
    charge_gas(vm, forwarded)?;

    let (success, gas_left, new_address, _output) =
        vm.generic_create(init_code, value_lit, forwarded, salt_lit)?;

    vm.frame_mut().state.gas_remaining += gas_left;
    let result = if success {
        crate::primitives::address_to_word(new_address)
    } else {
        U256::zero()
    };
    push(vm, Expr::lit(result))?;
    advance(vm, opcode);
    Ok(StepOutcome::Continue)
}

pub fn op_call(vm: &mut VM, opcode: Opcode) -> VMResultT<StepOutcome> {
    use Opcode::*;

    // Peek (never pop) just enough to know whether `generic_call` would
    // suspend (an uncached FFI call, or a callee whose code lives behind
    // a remote `Database`) before touching the stack for real. This
    // makes re-dispatching `CALL`/`CALLCODE`/`DELEGATECALL`/`STATICCALL`
    // from scratch on resume safe — the operands are still exactly where
    // they were (§4.H).
    let has_value_slot = matches!(opcode, Call | CallCode);
    let args_offset_depth = if has_value_slot { 3 } else { 2 };
    let args_size_depth = args_offset_depth + 1;
    let addr_word = peek(vm, 1)?;
    let addr = crate::branch::force_concrete(&addr_word).map(word_to_address)?;
    let args_offset = peek(vm, args_offset_depth)?;
    let args_size = peek(vm, args_size_depth)?;
    let memory = vm.frame().state.memory.clone();
    let precheck_calldata = ops::copy_slice(
        Expr::lit(U256::zero()),
        args_offset,
        args_size,
        memory,
        Buf::Concrete(crate::primitives::Bytes::new()),
    );
    vm.precheck_call(addr, &precheck_calldata)?;

    let gas_requested = pop(vm)?;
    let addr_word = pop(vm)?;
    let value = if matches!(opcode, Call | CallCode) {
        pop(vm)?
    } else {
        Expr::lit(U256::zero())
    };
    let args_offset = pop(vm)?;
    let args_size = pop(vm)?;
    let ret_offset = pop(vm)?;
    let ret_size = pop(vm)?;

    if opcode == Call {
        let has_value = value.as_lit().map(|v| !v.is_zero()).unwrap_or(true);
        if has_value {
            super::require_not_static(vm)?;
        }
    }

    let addr = crate::branch::force_concrete(&addr_word).map(word_to_address)?;
    let args_size_usize = concrete_usize(&args_size)?;
    let ret_size_usize = concrete_usize(&ret_size)?;
    let args_off = concrete_usize(&args_offset)?;
    let ret_off = concrete_usize(&ret_offset)?;

    let is_cold = vm.is_address_cold(addr);
    let transfers_value = value.as_lit().map(|v| !v.is_zero()).unwrap_or(false);
    let creates_account = !vm.account_exists(addr)?;
    let base_cost = crate::gas::call_base_cost(&vm.config.fee_schedule, is_cold, transfers_value, creates_account);
    charge_gas(vm, base_cost)?;
    charge_memory_expansion(vm, args_off as u64, args_size_usize as u64)?;
    charge_memory_expansion(vm, ret_off as u64, ret_size_usize as u64)?;

    let gas_requested_lit = crate::branch::force_concrete(&gas_requested)?;
    let gas_requested_u64 = gas_requested_lit.low_u64();
    let remaining = vm.frame().state.gas_remaining;
    let forwarded = crate::gas::gas_to_forward(gas_requested_u64, remaining, transfers_value);
    charge_gas(vm, forwarded)?;
    let stipend = if transfers_value { vm.config.fee_schedule.g_callstipend } else { 0 };

    let memory = vm.frame().state.memory.clone();
    let calldata = ops::copy_slice(
        Expr::lit(U256::zero()),
        args_offset,
        args_size,
        memory,
        Buf::Concrete(crate::primitives::Bytes::new()),
    );

    let this = vm.frame().this;
    let (code_address, callee_this, is_static, should_transfer) = match opcode {
        Call => (addr, addr, vm.frame().is_static, true),
        CallCode => (addr, this, vm.frame().is_static, true),
        DelegateCall => (addr, this, vm.frame().is_static, false),
        StaticCall => (addr, addr, true, false),
        _ => unreachable!(),
    };

    let call_value = if opcode == DelegateCall {
        vm.frame().call_value.clone()
    } else {
        value
    };

    // `DELEGATECALL` reports the *inherited* caller (this frame's own
    // `caller`, i.e. the grandparent's `msg.sender`) rather than `this`
    // (§4.F) — every other call kind leaves the callee's `caller` as the
    // immediate calling contract, which `Frame::child_call` defaults to.
    let caller_override = if opcode == DelegateCall {
        Some(vm.frame().caller)
    } else {
        None
    };

    let (success, gas_left, output) = vm.generic_call(
        code_address,
        callee_this,
        caller_override,
        calldata,
        call_value,
        forwarded + stipend,
        is_static,
        should_transfer,
    )?;

    vm.frame_mut().state.gas_remaining += gas_left;
    vm.frame_mut().state.return_data = output.clone();

    if let Some(out_bytes) = ops::to_list(&output) {
        let write_len = out_bytes.len().min(ret_size_usize);
        if write_len > 0 {
            let frame = vm.frame_mut();
            frame.state.memory = ops::copy_slice(
                Expr::lit(U256::from(ret_off)),
                Expr::lit(U256::zero()),
                Expr::lit(U256::from(write_len)),
                Buf::Concrete(out_bytes.into()),
                frame.state.memory.clone(),
            );
        }
    }

    push(vm, Expr::lit(bool_word(success)))?;
    advance(vm, opcode);
    Ok(StepOutcome::Continue)
}

pub fn op_return(vm: &mut VM) -> VMResultT<StepOutcome> {
    let offset = pop(vm)?;
    let size = pop(vm)?;
    let size_usize = concrete_usize(&size)?;
    let off = concrete_usize(&offset)?;
    charge_memory_expansion(vm, off as u64, size_usize as u64)?;
    let memory = vm.frame().state.memory.clone();
    let output = ops::copy_slice(
        Expr::lit(U256::zero()),
        offset,
        size,
        memory,
        Buf::Concrete(crate::primitives::Bytes::new()),
    );
    Ok(StepOutcome::Halt(output))
}

pub fn op_revert(vm: &mut VM) -> VMResultT<StepOutcome> {
    let offset = pop(vm)?;
    let size = pop(vm)?;
    let size_usize = concrete_usize(&size)?;
    let off = concrete_usize(&offset)?;
    charge_memory_expansion(vm, off as u64, size_usize as u64)?;
    let memory = vm.frame().state.memory.clone();
    let output = ops::copy_slice(
        Expr::lit(U256::zero()),
        offset,
        size,
        memory,
        Buf::Concrete(crate::primitives::Bytes::new()),
    );
    Ok(StepOutcome::Revert(output))
}

pub fn op_selfdestruct(vm: &mut VM) -> VMResultT<StepOutcome> {
    super::require_not_static(vm)?;
    let beneficiary_word = peek(vm, 0)?;
    let beneficiary = crate::branch::force_concrete(&beneficiary_word).map(word_to_address)?;
    vm.ensure_account_loaded(beneficiary)?;
    pop(vm)?;

    let is_cold = vm.is_address_cold(beneficiary);
    let this = vm.frame().this;
    let balance = vm.balance_of(this)?;
    let beneficiary_is_new = !vm.account_exists(beneficiary)?;
    let mut cost = vm.config.fee_schedule.g_selfdestruct;
    if is_cold {
        cost += vm.config.fee_schedule.g_cold_account_access;
    }
    if beneficiary_is_new && !balance.is_zero() {
        cost += vm.config.fee_schedule.g_selfdestruct_newaccount;
    }
    charge_gas(vm, cost)?;

    if !balance.is_zero() && beneficiary != this {
        vm.transfer_value(this, beneficiary, balance)?;
    }
    vm.substate.schedule_selfdestruct(this);

    Ok(StepOutcome::Halt(Buf::Concrete(crate::primitives::Bytes::new())))
}

fn bool_word(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}
