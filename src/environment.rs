//! Transaction and block environment (§3 "Env", "Block").
//!
//! These are plain read-only records the step function consults for
//! `ORIGIN`, `GASPRICE`, `COINBASE`, `TIMESTAMP`, `NUMBER`, `PREVRANDAO`,
//! `CHAINID`, `BASEFEE` and `BLOCKHASH`. Grounded on the `BlockEnv`/`TxEnv`
//! split used throughout `lambdaclass-ethrex`'s levm crate.

use crate::constants::FeeSchedule;
use crate::primitives::{Address, H256, U256};
use std::collections::HashMap;

/// Block-level values visible to executing bytecode (§3).
#[derive(Debug, Clone)]
pub struct Block {
    pub number: U256,
    pub timestamp: U256,
    pub coinbase: Address,
    pub prev_randao: H256,
    pub gas_limit: u64,
    pub base_fee: U256,
    pub chain_id: U256,
    /// Last 256 block hashes, most recent last, for `BLOCKHASH` (§4.E).
    pub recent_hashes: Vec<H256>,
}

impl Block {
    /// `BLOCKHASH`: zero for blocks more than 256 behind the current one,
    /// the current block, or any future block (§4.E edge case).
    pub fn hash_of(&self, queried: U256) -> H256 {
        if queried >= self.number {
            return H256::zero();
        }
        let Some(distance) = self.number.checked_sub(queried) else {
            return H256::zero();
        };
        let Ok(distance) = usize::try_from(distance) else {
            return H256::zero();
        };
        if distance == 0 || distance > 256 || distance > self.recent_hashes.len() {
            return H256::zero();
        }
        self.recent_hashes[self.recent_hashes.len() - distance]
    }
}

/// Transaction-level values (§3 "Env").
#[derive(Debug, Clone)]
pub struct Env {
    pub origin: Address,
    pub gas_price: U256,
    pub block: Block,
    pub fee_schedule: FeeSchedule,
    /// EIP-2930 access list, pre-warmed before execution starts (§4.B).
    pub access_list: Vec<(Address, Vec<U256>)>,
}

/// Mutable per-transaction bookkeeping that is neither state nor substate:
/// whether allowFFI is set for this run, plus the handful of values
/// finalisation needs that aren't part of the substate (§3 "TxState", §4.G
/// cheatcodes). The running gas-refund counter itself lives on `SubState`,
/// since it rolls back with the rest of the substate on a reverted call.
#[derive(Debug, Clone, Default)]
pub struct TxState {
    pub allow_ffi: bool,
    /// The transaction's gas limit, recorded by `VM::start_call` so
    /// finalisation (§4.I) can compute `gas_remaining = gaslimit -
    /// gas_used` without threading it through separately.
    pub gas_limit: u64,
    /// EIP-1559 priority fee (the tip), credited to the coinbase on
    /// successful finalisation (§4.I); zero for a non-1559 transaction.
    pub priority_fee: U256,
    /// `sha3_preimages`: concrete SHA3 inputs recorded as they're hashed,
    /// keyed by the resulting digest, so cheatcodes and tracing can
    /// recover "what hashed to this" without re-deriving it (§4.H, §9).
    pub sha3_preimages: HashMap<U256, Vec<u8>>,
}

impl TxState {
    pub fn record_preimage(&mut self, digest: U256, preimage: Vec<u8>) {
        self.sha3_preimages.entry(digest).or_insert(preimage);
    }
}
