//! Fee-schedule constants (§6) and protocol-wide limits.
//!
//! Values are the Ethereum Shanghai-era schedule named in the specification.
//! They are grouped into [`FeeSchedule`] so callers can vary them (e.g. for
//! property tests against a different fork) instead of reaching for bare
//! globals.

use crate::primitives::{Address, U256};

pub const WORD_SIZE: usize = 32;

pub const STACK_LIMIT: usize = 1024;
pub const CALL_DEPTH_LIMIT: usize = 1024;
pub const MAX_CODE_SIZE: usize = 0x6000;
pub const MAX_INIT_CODE_SIZE: usize = 2 * MAX_CODE_SIZE;
pub const INVALID_CONTRACT_PREFIX: u8 = 0xEF;

pub const JUMPDEST_OPCODE: u8 = 0x5b;

/// The gas-cost table of the specification's §6, bundled so it can be
/// threaded through gas math instead of referenced as bare globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub g_zero: u64,
    pub g_base: u64,
    pub g_verylow: u64,
    pub g_low: u64,
    pub g_mid: u64,
    pub g_high: u64,
    pub g_sload: u64,
    pub g_sset: u64,
    pub g_sreset: u64,
    pub g_cold_sload: u64,
    pub g_cold_account_access: u64,
    pub g_warm_storage_read: u64,
    pub g_newaccount: u64,
    pub g_create: u64,
    pub g_callvalue: u64,
    pub g_callstipend: u64,
    pub g_log: u64,
    pub g_logdata: u64,
    pub g_logtopic: u64,
    pub g_sha3: u64,
    pub g_sha3word: u64,
    pub g_memory: u64,
    pub g_copy: u64,
    pub g_jumpdest: u64,
    pub g_codedeposit: u64,
    pub g_selfdestruct: u64,
    pub g_selfdestruct_newaccount: u64,
    pub g_blockhash: u64,
    pub g_exp: u64,
    pub g_expbyte: u64,
    pub g_access_list_storage_key: u64,
    pub g_access_list_address: u64,
    pub g_ecadd: u64,
    pub g_ecmul: u64,
    pub g_pairing_point: u64,
    pub g_pairing_base: u64,
    pub g_fround: u64,
    pub r_block: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            g_zero: 0,
            g_base: 2,
            g_verylow: 3,
            g_low: 5,
            g_mid: 8,
            g_high: 10,
            g_sload: 100,
            g_sset: 20_000,
            g_sreset: 2_900,
            g_cold_sload: 2_100,
            g_cold_account_access: 2_600,
            g_warm_storage_read: 100,
            g_newaccount: 25_000,
            g_create: 32_000,
            g_callvalue: 9_000,
            g_callstipend: 2_300,
            g_log: 375,
            g_logdata: 8,
            g_logtopic: 375,
            g_sha3: 30,
            g_sha3word: 6,
            g_memory: 3,
            g_copy: 3,
            g_jumpdest: 1,
            g_codedeposit: 200,
            g_selfdestruct: 5_000,
            g_selfdestruct_newaccount: 25_000,
            g_blockhash: 20,
            g_exp: 10,
            g_expbyte: 50,
            g_access_list_storage_key: 1_900,
            g_access_list_address: 2_400,
            g_ecadd: 150,
            g_ecmul: 6_000,
            g_pairing_point: 34_000,
            g_pairing_base: 45_000,
            g_fround: 1,
            r_block: 0, // post-merge: no ommer/uncle block reward
        }
    }
}

lazy_static::lazy_static! {
    /// Low 160 bits of `keccak256("hevm cheat code")` — the magic address
    /// cheatcode calls are dispatched against (§4.G, §6).
    pub static ref CHEAT_CODE_ADDRESS: Address = {
        use sha3::{Digest, Keccak256};
        let digest = Keccak256::digest(b"hevm cheat code");
        Address::from_slice(&digest[12..])
    };
}

/// Addresses 0x01..=0x09 are the precompiles (§4.G).
pub fn is_precompile_address(addr: Address) -> bool {
    let word = U256::from_big_endian(addr.as_bytes());
    word >= U256::one() && word <= U256::from(9)
}

/// `allButOne64th(n) = n - n/64` (EIP-150).
pub fn all_but_one_64th(n: u64) -> u64 {
    n.saturating_sub(n / 64)
}

/// `ceilDiv(a, b) = ceil(a / b)`.
pub fn ceil_div(a: u64, b: u64) -> u64 {
    if b == 0 {
        return 0;
    }
    a.saturating_add(b - 1) / b
}
