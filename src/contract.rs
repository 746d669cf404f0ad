//! Loaded contract code (§3 "Contract", §4.C).
//!
//! A `Contract` pairs the raw bytecode with the decode metadata the step
//! function needs at every PC: the opcode at each index and a jump-table
//! mapping byte offsets to JUMPDEST validity. Grounded on the
//! `op_ix_map`/`code_ops` precomputation other `levm` forks build once per
//! loaded contract rather than re-decoding on every JUMP.

use crate::constants::{INVALID_CONTRACT_PREFIX, MAX_CODE_SIZE};
use crate::errors::VMError;
use crate::opcodes::Opcode;
use crate::primitives::{Bytes, H256};
use std::collections::HashSet;
use std::sync::Arc;

/// Whether code is still being run as an initcode (no `STOP`-on-exhaustion
/// stipend, runtime code not yet deployed) or as deployed runtime code
/// (§3 "ContractCode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    InitCode,
    RuntimeCode,
}

/// A contract's code plus the decode metadata derived from it once at
/// load time (§4.C).
#[derive(Debug, Clone)]
pub struct Contract {
    pub code: Arc<Bytes>,
    pub kind: CodeKind,
    pub codehash: H256,
    /// Byte offsets that are valid `JUMPDEST` targets.
    jump_dests: Arc<HashSet<usize>>,
    /// True when this contract was loaded from outside the symbolic world
    /// (an externally-fetched, unmodified account) — used to decide
    /// whether `EXTCODEHASH`/`EXTCODECOPY` may return symbolic results.
    pub external: bool,
}

impl Contract {
    pub fn new(code: Bytes, kind: CodeKind, external: bool) -> Result<Contract, VMError> {
        if kind == CodeKind::RuntimeCode
            && !code.is_empty()
            && code[0] == INVALID_CONTRACT_PREFIX
        {
            return Err(VMError::InvalidFormat);
        }
        if kind == CodeKind::RuntimeCode && code.len() > MAX_CODE_SIZE {
            return Err(VMError::MaxCodeSizeExceeded {
                limit: MAX_CODE_SIZE,
                got: code.len(),
            });
        }
        let codehash = keccak(&code);
        let jump_dests = Arc::new(compute_jump_dests(&code));
        Ok(Contract {
            code: Arc::new(code),
            kind,
            codehash,
            jump_dests,
            external,
        })
    }

    pub fn empty() -> Contract {
        Contract {
            code: Arc::new(Bytes::new()),
            kind: CodeKind::RuntimeCode,
            codehash: keccak(&Bytes::new()),
            jump_dests: Arc::new(HashSet::new()),
            external: false,
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Decode the opcode at `pc`, or `None` past the end of the code
    /// (falls through to an implicit `STOP`, §4.E).
    pub fn opcode_at(&self, pc: usize) -> Option<Opcode> {
        self.code.get(pc).and_then(|b| Opcode::decode(*b))
    }

    /// The raw byte at `pc`, treating out-of-range as an implicit `STOP`
    /// (0x00), matching real EVM bytecode semantics.
    pub fn byte_at(&self, pc: usize) -> u8 {
        self.code.get(pc).copied().unwrap_or(0x00)
    }

    /// `n` bytes of immediate data following a `PUSHn` at `pc`, zero
    /// padded if the code ends early.
    pub fn push_immediate(&self, pc: usize, n: usize) -> ethereum_types::U256 {
        let mut buf = [0u8; 32];
        for i in 0..n {
            buf[32 - n + i] = self.byte_at(pc + 1 + i);
        }
        ethereum_types::U256::from_big_endian(&buf)
    }

    /// `JUMP`/`JUMPI` validity check: `pc` must land exactly on a
    /// `JUMPDEST` opcode, and must not be inside a `PUSHn`'s immediate
    /// data (§4.E "bad jump destination" edge case).
    pub fn is_valid_jump_dest(&self, pc: usize) -> bool {
        self.jump_dests.contains(&pc)
    }
}

fn keccak(bytes: &[u8]) -> H256 {
    use sha3::{Digest, Keccak256};
    H256::from_slice(&Keccak256::digest(bytes))
}

fn compute_jump_dests(code: &[u8]) -> HashSet<usize> {
    let mut dests = HashSet::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let byte = code[pc];
        if byte == crate::constants::JUMPDEST_OPCODE {
            dests.insert(pc);
            pc += 1;
            continue;
        }
        let step = Opcode::decode(byte).map(Opcode::op_size).unwrap_or(1);
        pc += step;
    }
    dests
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_immediate_bytes_are_not_jump_dests() {
        // PUSH1 0x5b -- the 0x5b is data, not a JUMPDEST.
        let code = Bytes::from(vec![0x60, 0x5b, 0x00]);
        let contract = Contract::new(code, CodeKind::RuntimeCode, false).unwrap();
        assert!(!contract.is_valid_jump_dest(1));
    }

    #[test]
    fn real_jumpdest_is_valid() {
        let code = Bytes::from(vec![0x5b, 0x00]);
        let contract = Contract::new(code, CodeKind::RuntimeCode, false).unwrap();
        assert!(contract.is_valid_jump_dest(0));
    }

    #[test]
    fn rejects_0xef_prefixed_runtime_code() {
        let code = Bytes::from(vec![0xEF, 0x00]);
        assert!(matches!(
            Contract::new(code, CodeKind::RuntimeCode, false),
            Err(VMError::InvalidFormat)
        ));
    }

    #[test]
    fn allows_0xef_prefix_in_initcode() {
        let code = Bytes::from(vec![0xEF, 0x00]);
        assert!(Contract::new(code, CodeKind::InitCode, false).is_ok());
    }
}
