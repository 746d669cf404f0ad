//! `LT`..`ISZERO` (§4.E).

use super::{advance, charge_gas, pop, push};
use crate::errors::VMResultT;
use crate::expr::ops;
use crate::opcodes::Opcode;
use crate::vm::VM;

pub fn step(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    use Opcode::*;
    charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
    match opcode {
        Lt => {
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::lt(a, b))?;
        }
        Gt => {
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::gt(a, b))?;
        }
        SLt => {
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::slt(a, b))?;
        }
        SGt => {
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::sgt(a, b))?;
        }
        Eq => {
            let (a, b) = (pop(vm)?, pop(vm)?);
            push(vm, ops::eq(a, b))?;
        }
        IsZero => {
            let a = pop(vm)?;
            push(vm, ops::iszero(a))?;
        }
        _ => unreachable!("dispatch only routes comparison opcodes here"),
    }
    advance(vm, opcode);
    Ok(())
}
