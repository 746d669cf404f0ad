//! `AND`..`SAR` (§4.E).

use super::{advance, charge_gas, pop, push};
use crate::errors::VMResultT;
use crate::expr::ops;
use crate::opcodes::Opcode;
use crate::vm::VM;

pub fn step(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    use Opcode::*;
    let cost = match opcode {
        Byte | Shl | Shr | Sar => vm.config.fee_schedule.g_verylow,
        _ => vm.config.fee_schedule.g_verylow,
    };
    charge_gas(vm, cost)?;
    match opcode {
        And => {
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::bitand(a, b))?;
        }
        Or => {
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::bitor(a, b))?;
        }
        Xor => {
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::bitxor(a, b))?;
        }
        Not => {
            let a = pop(vm)?;
            push(vm, ops::not(a))?;
        }
        Byte => {
            let (index, value) = (pop(vm)?, pop(vm)?);
            push(vm, ops::byte(index, value))?;
        }
        Shl => {
            let (shift, value) = (pop(vm)?, pop(vm)?);
            push(vm, ops::shl(value, shift))?;
        }
        Shr => {
            let (shift, value) = (pop(vm)?, pop(vm)?);
            push(vm, ops::shr(value, shift))?;
        }
        Sar => {
            let (shift, value) = (pop(vm)?, pop(vm)?);
            push(vm, ops::sar(value, shift))?;
        }
        _ => unreachable!("dispatch only routes bitwise opcodes here"),
    }
    advance(vm, opcode);
    Ok(())
}
