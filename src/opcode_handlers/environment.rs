//! Environment/context opcodes (§4.E): `ADDRESS`..`BASEFEE`.

use super::{advance, charge_gas, charge_memory_expansion, concrete_usize, peek, pop, push};
use crate::errors::VMResultT;
use crate::expr::{ops, Buf, Expr};
use crate::opcodes::Opcode;
use crate::primitives::{address_to_word, U256};
use crate::vm::VM;

pub fn step(vm: &mut VM, opcode: Opcode) -> VMResultT<()> {
    use Opcode::*;
    match opcode {
        Address => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let addr = vm.frame().this;
            push(vm, Expr::lit(address_to_word(addr)))?;
        }
        Balance => {
            let addr_word = pop(vm)?;
            let addr = crate::branch::force_concrete(&addr_word)
                .map(crate::primitives::word_to_address)?;
            let is_cold = vm.is_address_cold(addr);
            charge_gas(vm, crate::gas::account_access_cost(&vm.config.fee_schedule, is_cold))?;
            let balance = vm.balance_of(addr);
            push(vm, Expr::lit(balance))?;
        }
        Origin => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(address_to_word(vm.env.origin)))?;
        }
        Caller => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let caller = vm.frame().caller;
            push(vm, Expr::lit(address_to_word(caller)))?;
        }
        CallValue => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let value = vm.frame().call_value.clone();
            push(vm, value)?;
        }
        CallDataLoad => {
            charge_gas(vm, vm.config.fee_schedule.g_verylow)?;
            let offset = pop(vm)?;
            let calldata = vm.frame().calldata().cloned().unwrap_or(Buf::Concrete(crate::primitives::Bytes::new()));
            let word = match offset.as_lit() {
                Some(off) => ops::read_word(off, &calldata),
                None => return Err(crate::branch::suspend(offset, Vec::new())),
            };
            push(vm, word)?;
        }
        CallDataSize => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let calldata = vm.frame().calldata().cloned().unwrap_or(Buf::Concrete(crate::primitives::Bytes::new()));
            push(vm, ops::buf_length(&calldata))?;
        }
        CallDataCopy => {
            let dest_offset = pop(vm)?;
            let offset = pop(vm)?;
            let size = pop(vm)?;
            let size_usize = concrete_usize(&size)?;
            charge_gas(
                vm,
                vm.config.fee_schedule.g_verylow
                    + crate::gas::copy_cost(&vm.config.fee_schedule, size_usize as u64, vm.config.fee_schedule.g_copy),
            )?;
            let dest_offset_usize = concrete_usize(&dest_offset)?;
            charge_memory_expansion(vm, dest_offset_usize as u64, size_usize as u64)?;
            let calldata = vm.frame().calldata().cloned().unwrap_or(Buf::Concrete(crate::primitives::Bytes::new()));
            let frame = vm.frame_mut();
            frame.state.memory = ops::copy_slice(
                dest_offset,
                offset,
                size,
                calldata,
                frame.state.memory.clone(),
            );
        }
        CodeSize => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let len = vm.frame().contract.len();
            push(vm, Expr::lit(U256::from(len)))?;
        }
        CodeCopy => {
            let dest_offset = pop(vm)?;
            let offset = pop(vm)?;
            let size = pop(vm)?;
            let size_usize = concrete_usize(&size)?;
            charge_gas(
                vm,
                vm.config.fee_schedule.g_verylow
                    + crate::gas::copy_cost(&vm.config.fee_schedule, size_usize as u64, vm.config.fee_schedule.g_copy),
            )?;
            let dest_offset_usize = concrete_usize(&dest_offset)?;
            charge_memory_expansion(vm, dest_offset_usize as u64, size_usize as u64)?;
            let code = Buf::Concrete(vm.frame().contract.code.as_ref().clone());
            let frame = vm.frame_mut();
            frame.state.memory = ops::copy_slice(dest_offset, offset, size, code, frame.state.memory.clone());
        }
        GasPrice => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(vm.env.gas_price))?;
        }
        ExtCodeSize => {
            let addr_word = pop(vm)?;
            let addr = crate::branch::force_concrete(&addr_word).map(crate::primitives::word_to_address)?;
            let is_cold = vm.is_address_cold(addr);
            charge_gas(vm, crate::gas::account_access_cost(&vm.config.fee_schedule, is_cold))?;
            let contract = vm.load_contract(addr)?;
            push(vm, Expr::lit(U256::from(contract.len())))?;
        }
        ExtCodeCopy => {
            let addr_word = pop(vm)?;
            let dest_offset = pop(vm)?;
            let offset = pop(vm)?;
            let size = pop(vm)?;
            let addr = crate::branch::force_concrete(&addr_word).map(crate::primitives::word_to_address)?;
            let is_cold = vm.is_address_cold(addr);
            let size_usize = concrete_usize(&size)?;
            charge_gas(
                vm,
                crate::gas::account_access_cost(&vm.config.fee_schedule, is_cold)
                    + crate::gas::copy_cost(&vm.config.fee_schedule, size_usize as u64, vm.config.fee_schedule.g_copy),
            )?;
            let dest_offset_usize = concrete_usize(&dest_offset)?;
            charge_memory_expansion(vm, dest_offset_usize as u64, size_usize as u64)?;
            let contract = vm.load_contract(addr)?;
            let code = Buf::Concrete(contract.code.as_ref().clone());
            let frame = vm.frame_mut();
            frame.state.memory = ops::copy_slice(dest_offset, offset, size, code, frame.state.memory.clone());
        }
        ReturnDataSize => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            let return_data = vm.frame().state.return_data.clone();
            push(vm, ops::buf_length(&return_data))?;
        }
        ReturnDataCopy => {
            let dest_offset = pop(vm)?;
            let offset = pop(vm)?;
            let size = pop(vm)?;
            let size_usize = concrete_usize(&size)?;
            charge_gas(
                vm,
                vm.config.fee_schedule.g_verylow
                    + crate::gas::copy_cost(&vm.config.fee_schedule, size_usize as u64, vm.config.fee_schedule.g_copy),
            )?;
            let dest_offset_usize = concrete_usize(&dest_offset)?;
            charge_memory_expansion(vm, dest_offset_usize as u64, size_usize as u64)?;
            let return_data = vm.frame().state.return_data.clone();
            if let Some(len) = ops::conc_prefix(&return_data) {
                let off = concrete_usize(&offset)?;
                if off.saturating_add(size_usize) > len {
                    return Err(crate::errors::VMError::InvalidMemoryAccess);
                }
            }
            let frame = vm.frame_mut();
            frame.state.memory = ops::copy_slice(dest_offset, offset, size, return_data, frame.state.memory.clone());
        }
        ExtCodeHash => {
            let addr_word = pop(vm)?;
            let addr = crate::branch::force_concrete(&addr_word).map(crate::primitives::word_to_address)?;
            let is_cold = vm.is_address_cold(addr);
            charge_gas(vm, crate::gas::account_access_cost(&vm.config.fee_schedule, is_cold))?;
            let contract = vm.load_contract(addr)?;
            let hash = if vm.account_exists(addr) {
                U256::from_big_endian(contract.codehash.as_bytes())
            } else {
                U256::zero()
            };
            push(vm, Expr::lit(hash))?;
        }
        BlockHash => {
            charge_gas(vm, vm.config.fee_schedule.g_blockhash)?;
            let queried = pop(vm)?;
            let hash = match queried.as_lit() {
                Some(n) => vm.env.block.hash_of(n),
                None => return Err(crate::branch::suspend(queried, Vec::new())),
            };
            push(vm, Expr::lit(U256::from_big_endian(hash.as_bytes())))?;
        }
        Coinbase => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(address_to_word(vm.env.block.coinbase)))?;
        }
        Timestamp => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(vm.env.block.timestamp))?;
        }
        Number => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(vm.env.block.number))?;
        }
        PrevRandao => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(U256::from_big_endian(vm.env.block.prev_randao.as_bytes())))?;
        }
        GasLimit => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(U256::from(vm.env.block.gas_limit)))?;
        }
        ChainId => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(vm.env.block.chain_id))?;
        }
        SelfBalance => {
            charge_gas(vm, vm.config.fee_schedule.g_low)?;
            let this = vm.frame().this;
            let balance = vm.balance_of(this);
            push(vm, Expr::lit(balance))?;
        }
        BaseFee => {
            charge_gas(vm, vm.config.fee_schedule.g_base)?;
            push(vm, Expr::lit(vm.env.block.base_fee))?;
        }
        _ => unreachable!("dispatch only routes environment opcodes here"),
    }
    advance(vm, opcode);
    Ok(())
}
