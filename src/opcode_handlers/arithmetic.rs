//! `ADD`..`SIGNEXTEND` (§4.E).

use super::{advance, charge_gas, pop, push};
use crate::errors::VMResultT;
use crate::expr::ops;
use crate::opcodes::Opcode;
use crate::vm::VM;

pub fn step(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    use Opcode::*;
    let schedule = vm.config.fee_schedule;
    match opcode {
        Add => {
            charge_gas(vm, schedule.g_verylow)?;
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::add(a, b))?;
        }
        Mul => {
            charge_gas(vm, schedule.g_low)?;
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::mul(a, b))?;
        }
        Sub => {
            charge_gas(vm, schedule.g_verylow)?;
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::sub(a, b))?;
        }
        Div => {
            charge_gas(vm, schedule.g_low)?;
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::div(a, b))?;
        }
        SDiv => {
            charge_gas(vm, schedule.g_low)?;
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::sdiv(a, b))?;
        }
        Mod => {
            charge_gas(vm, schedule.g_low)?;
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::rem(a, b))?;
        }
        SMod => {
            charge_gas(vm, schedule.g_low)?;
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::srem(a, b))?;
        }
        AddMod => {
            charge_gas(vm, schedule.g_mid)?;
            let (a, b, n) = (pop(vm)?, pop(vm)?, pop(vm)?);
            push(vm, ops::addmod(a, b, n))?;
        }
        MulMod => {
            charge_gas(vm, schedule.g_mid)?;
            let (a, b, n) = (pop(vm)?, pop(vm)?, pop(vm)?);
            push(vm, ops::mulmod(a, b, n))?;
        }
        Exp => {
            let base = pop(vm)?;
            let exponent = pop(vm)?;
            // Pricing forces the exponent to a literal (§4.E): a symbolic
            // exponent can't be priced without one, so this raises
            // `UnexpectedSymbolicArg` rather than guessing a byte length.
            let exponent_lit = crate::branch::force_concrete(&exponent)?;
            charge_gas(vm, crate::gas::exp_cost(&schedule, byte_len(exponent_lit)))?;
            push(vm, ops::exp(base, crate::expr::Expr::lit(exponent_lit)))?;
        }
        SignExtend => {
            charge_gas(vm, schedule.g_low)?;
            let (byte_index, value) = (pop(vm)?, pop(vm)?);
            push(vm, ops::signextend(byte_index, value))?;
        }
        _ => unreachable!("dispatch only routes arithmetic opcodes here"),
    }
    advance(vm, opcode);
    Ok(())
}

fn byte_len(value: crate::primitives::U256) -> u64 {
    let bytes = crate::primitives::word_to_bytes(value);
    let leading_zeros = bytes.iter().take_while(|b| **b == 0).count();
    (32 - leading_zeros) as u64
}
