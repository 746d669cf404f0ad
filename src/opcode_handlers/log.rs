//! `LOG0`..`LOG4` (§4.E).

use super::{advance, charge_gas, charge_memory_expansion, concrete_usize, pop, require_not_static};
use crate::call_frame::LogEntry;
use crate::errors::VMResultT;
use crate::expr::{ops, Expr};
use crate::opcodes::Opcode;
use crate::primitives::U256;
use crate::vm::VM;

pub fn step(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    require_not_static(vm)?;
    let n = opcode
        .immediate_n()
        .ok_or(crate::errors::InternalError::BadImmediateDispatch(opcode))?;

    let offset = pop(vm)?;
    let size = pop(vm)?;
    let mut topics = Vec::with_capacity(n);
    for _ in 0..n {
        topics.push(pop(vm)?);
    }

    let size_usize = concrete_usize(&size)?;
    charge_gas(vm, crate::gas::log_cost(&vm.config.fee_schedule, n as u64, size_usize as u64))?;
    let off = concrete_usize(&offset)?;
    charge_memory_expansion(vm, off as u64, size_usize as u64)?;

    let memory = vm.frame().state.memory.clone();
    let data = ops::copy_slice(
        Expr::lit(U256::zero()),
        offset,
        size,
        memory,
        crate::expr::Buf::Concrete(crate::primitives::Bytes::new()),
    );

    let address = vm.frame().this;
    vm.frame_mut().state.logs.push(LogEntry {
        address,
        topics,
        data,
    });

    advance(vm, opcode);
    Ok(())
}
