//! Cheatcode dispatch (§4.G, §9 Open Questions).
//!
//! Calls to [`crate::constants::CHEAT_CODE_ADDRESS`] are intercepted
//! before the normal call protocol runs and dispatched here by 4-byte
//! selector, hevm-style. Gated behind the crate's `cheat` feature since a
//! production embedding of this interpreter (as opposed to a test
//! harness) has no legitimate reason to expose `vm.store`/`vm.sign` to
//! untrusted bytecode.

#![cfg(feature = "cheat")]

use crate::environment::TxState;
use crate::errors::{Query, VMError};
use crate::primitives::{Address, U256};

/// Selectors this crate recognizes, computed the same way Solidity
/// function selectors are (first 4 bytes of
/// `keccak256("signature(types)")`), hard-coded here rather than derived
/// at runtime since the set is fixed and small.
pub mod selectors {
    pub const WARP: [u8; 4] = [0x02, 0x3d, 0x30, 0x6b]; // warp(uint256)
    pub const ROLL: [u8; 4] = [0x14, 0x0a, 0x8e, 0xfa]; // roll(uint256)
    pub const STORE: [u8; 4] = [0x70, 0xca, 0x10, 0xbb]; // store(address,bytes32,bytes32)
    pub const LOAD: [u8; 4] = [0x66, 0x7f, 0x9d, 0x70]; // load(address,bytes32)
    pub const SIGN: [u8; 4] = [0xe3, 0x41, 0xea, 0xa4]; // sign(uint256,bytes32)
    pub const ADDR: [u8; 4] = [0xff, 0xa1, 0x86, 0x49]; // addr(uint256)
    pub const FFI: [u8; 4] = [0x89, 0x16, 0x0f, 0xb1]; // ffi(string[])
}

/// The effect a cheatcode call has on interpreter state, distinct from
/// the bytes it returns to the caller (§4.G): some cheatcodes mutate the
/// block environment or storage directly rather than returning data.
pub enum CheatEffect {
    SetTimestamp(U256),
    SetBlockNumber(U256),
    WriteStorage { address: Address, slot: U256, value: U256 },
    /// `vm.load`: the caller must resolve `(address, slot)` through the
    /// same storage path `SLOAD` uses and substitute the result for
    /// `CheatResult::return_data`, since this module has no storage
    /// read access of its own.
    ReadStorage { address: Address, slot: U256 },
    None,
}

pub struct CheatResult {
    pub effect: CheatEffect,
    pub return_data: Vec<u8>,
}

/// Dispatch a cheatcode call. `calldata` is the full call input,
/// selector first. `allow_ffi` gates `vm.ffi` (§4.G: "ffi, which the
/// caller must opt into explicitly"). `ffi_answer` is the driver's
/// previously-supplied subprocess stdout for this exact `calldata`, if
/// any (§4.H resume path) — `None` means no answer has landed yet and a
/// fresh `vm.ffi` call must suspend.
pub fn dispatch(calldata: &[u8], tx: &TxState, ffi_answer: Option<&[u8]>) -> Result<CheatResult, VMError> {
    if calldata.len() < 4 {
        return Err(VMError::BadCheatCode { selector: None });
    }
    let selector: [u8; 4] = [calldata[0], calldata[1], calldata[2], calldata[3]];
    let args = &calldata[4..];

    match selector {
        selectors::WARP => Ok(CheatResult {
            effect: CheatEffect::SetTimestamp(word_arg(args, 0)),
            return_data: Vec::new(),
        }),
        selectors::ROLL => Ok(CheatResult {
            effect: CheatEffect::SetBlockNumber(word_arg(args, 0)),
            return_data: Vec::new(),
        }),
        selectors::STORE => {
            let address = crate::primitives::word_to_address(word_arg(args, 0));
            let slot = word_arg(args, 1);
            let value = word_arg(args, 2);
            Ok(CheatResult {
                effect: CheatEffect::WriteStorage { address, slot, value },
                return_data: Vec::new(),
            })
        }
        selectors::LOAD => {
            let address = crate::primitives::word_to_address(word_arg(args, 0));
            let slot = word_arg(args, 1);
            Ok(CheatResult {
                effect: CheatEffect::ReadStorage { address, slot },
                return_data: Vec::new(),
            })
        }
        selectors::SIGN => {
            let (v, r, s) =
                sign(word_arg(args, 0), word_arg(args, 1)).unwrap_or((0, U256::zero(), U256::zero()));
            let mut out = vec![0u8; 96];
            out[31] = v;
            out[32..64].copy_from_slice(&crate::primitives::word_to_bytes(r));
            out[64..96].copy_from_slice(&crate::primitives::word_to_bytes(s));
            Ok(CheatResult {
                effect: CheatEffect::None,
                return_data: out,
            })
        }
        selectors::ADDR => {
            let address = address_from_private_key(word_arg(args, 0));
            Ok(CheatResult {
                effect: CheatEffect::None,
                return_data: crate::primitives::word_to_bytes(crate::primitives::address_to_word(
                    address,
                ))
                .to_vec(),
            })
        }
        selectors::FFI => {
            if !tx.allow_ffi {
                return Err(VMError::BadCheatCode {
                    selector: Some(selector),
                });
            }
            match ffi_answer {
                Some(stdout) => Ok(CheatResult {
                    effect: CheatEffect::None,
                    return_data: encode_bytes(stdout),
                }),
                None => Err(VMError::Query(Box::new(Query::PleaseDoFfi {
                    argv: decode_argv(args),
                }))),
            }
        }
        other => Err(VMError::BadCheatCode {
            selector: Some(other),
        }),
    }
}

fn word_arg(args: &[u8], index: usize) -> U256 {
    let start = index * 32;
    let mut buf = [0u8; 32];
    for i in 0..32 {
        buf[i] = args.get(start + i).copied().unwrap_or(0);
    }
    U256::from_big_endian(&buf)
}

/// `vm.sign(privateKey, digest)`: recover `(v, r, s)` for the given
/// digest under the given secp256k1 private key, RFC 6979
/// deterministic-nonce ECDSA, the same two backends `ecrecover`
/// (`precompiles.rs`) already picks between via the crate's
/// `secp256k1` feature. Returns `None` for a private key outside
/// `[1, n)`, which the caller turns into the all-zero signature rather
/// than panicking.
#[cfg(feature = "secp256k1")]
fn sign(private_key: U256, digest: U256) -> Option<(u8, U256, U256)> {
    let key_bytes = crate::primitives::word_to_bytes(private_key);
    let secret_key = secp256k1::SecretKey::from_slice(&key_bytes).ok()?;
    let digest_bytes = crate::primitives::word_to_bytes(digest);
    let message = secp256k1::Message::from_digest(digest_bytes);
    let recoverable = secp256k1::SECP256K1.sign_ecdsa_recoverable(&message, &secret_key);
    let (recovery_id, bytes) = recoverable.serialize_compact();
    let r = U256::from_big_endian(&bytes[..32]);
    let s = U256::from_big_endian(&bytes[32..]);
    let v = 27u8.checked_add(u8::try_from(recovery_id.to_i32()).ok()?)?;
    Some((v, r, s))
}

#[cfg(not(feature = "secp256k1"))]
fn sign(private_key: U256, digest: U256) -> Option<(u8, U256, U256)> {
    let key_bytes = crate::primitives::word_to_bytes(private_key);
    let signing_key = k256::ecdsa::SigningKey::from_bytes((&key_bytes).into()).ok()?;
    let digest_bytes = crate::primitives::word_to_bytes(digest);
    let (signature, recovery_id) = signing_key.sign_prehash_recoverable(&digest_bytes).ok()?;
    let bytes = signature.to_bytes();
    let r = U256::from_big_endian(&bytes[..32]);
    let s = U256::from_big_endian(&bytes[32..]);
    let v = 27u8.checked_add(recovery_id.to_byte())?;
    Some((v, r, s))
}

fn address_from_private_key(private_key: U256) -> Address {
    let bytes = crate::primitives::word_to_bytes(private_key);
    let Ok(signing_key) = k256::ecdsa::SigningKey::from_bytes((&bytes).into()) else {
        return Address::zero();
    };
    let verifying_key = signing_key.verifying_key();
    let point = verifying_key.to_encoded_point(false);
    let uncompressed = point.as_bytes();
    use sha3::{Digest, Keccak256};
    let digest = Keccak256::digest(&uncompressed[1..]);
    Address::from_slice(&digest[12..])
}

/// ABI-encode `vm.ffi`'s `bytes memory` return value: a 32-byte offset,
/// a 32-byte length, the data itself, and zero-padding out to a word
/// boundary.
fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out[31] = 0x20;
    out.extend_from_slice(&crate::primitives::word_to_bytes(U256::from(data.len())));
    out.extend_from_slice(data);
    let padding = (32 - data.len() % 32) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

/// Minimal ABI decode of `string[]`, just enough for `vm.ffi`'s argv.
pub(crate) fn decode_argv(args: &[u8]) -> Vec<String> {
    let Some(offset) = word_arg(args, 0).as_usize().checked_mul(1) else {
        return Vec::new();
    };
    if offset + 32 > args.len() {
        return Vec::new();
    }
    let len = word_arg(&args[offset..], 0).as_usize();
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let elem_offset_pos = offset + 32 + i * 32;
        if elem_offset_pos + 32 > args.len() {
            break;
        }
        let elem_offset = offset + 32 + word_arg(&args[elem_offset_pos..], 0).as_usize();
        if elem_offset + 32 > args.len() {
            break;
        }
        let str_len = word_arg(&args[elem_offset..], 0).as_usize();
        let start = elem_offset + 32;
        let end = (start + str_len).min(args.len());
        out.push(String::from_utf8_lossy(&args[start..end]).into_owned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calldata(selector: [u8; 4], words: &[U256]) -> Vec<u8> {
        let mut out = selector.to_vec();
        for word in words {
            out.extend_from_slice(&crate::primitives::word_to_bytes(*word));
        }
        out
    }

    #[test]
    fn warp_decodes_the_requested_timestamp() {
        let tx = TxState::default();
        let data = calldata(selectors::WARP, &[U256::from(1_700_000_000u64)]);
        let result = dispatch(&data, &tx, None).expect("warp should dispatch");
        assert!(matches!(result.effect, CheatEffect::SetTimestamp(ts) if ts == U256::from(1_700_000_000u64)));
    }

    #[test]
    fn store_decodes_address_slot_and_value() {
        let tx = TxState::default();
        let addr = Address::repeat_byte(0x11);
        let data = calldata(
            selectors::STORE,
            &[crate::primitives::address_to_word(addr), U256::from(1), U256::from(42)],
        );
        let result = dispatch(&data, &tx, None).expect("store should dispatch");
        match result.effect {
            CheatEffect::WriteStorage { address, slot, value } => {
                assert_eq!(address, addr);
                assert_eq!(slot, U256::from(1));
                assert_eq!(value, U256::from(42));
            }
            other => panic!("expected WriteStorage, got a different effect: {}", matches_name(&other)),
        }
    }

    #[test]
    fn load_decodes_address_and_slot_rather_than_returning_empty() {
        let tx = TxState::default();
        let addr = Address::repeat_byte(0x22);
        let data = calldata(
            selectors::LOAD,
            &[crate::primitives::address_to_word(addr), U256::from(7)],
        );
        let result = dispatch(&data, &tx, None).expect("load should dispatch");
        match result.effect {
            CheatEffect::ReadStorage { address, slot } => {
                assert_eq!(address, addr);
                assert_eq!(slot, U256::from(7));
            }
            other => panic!("expected ReadStorage, got a different effect: {}", matches_name(&other)),
        }
    }

    #[test]
    fn ffi_is_rejected_unless_allowed() {
        let mut tx = TxState::default();
        tx.allow_ffi = false;
        let data = calldata(selectors::FFI, &[]);
        assert!(matches!(
            dispatch(&data, &tx, None),
            Err(VMError::BadCheatCode { selector: Some(sel) }) if sel == selectors::FFI
        ));
    }

    #[test]
    fn ffi_suspends_until_an_answer_is_supplied() {
        let mut tx = TxState::default();
        tx.allow_ffi = true;
        let data = calldata(selectors::FFI, &[U256::from(32), U256::zero()]);
        assert!(matches!(
            dispatch(&data, &tx, None),
            Err(VMError::Query(q)) if matches!(*q, Query::PleaseDoFfi { .. })
        ));
        let result = dispatch(&data, &tx, Some(b"hello")).expect("cached answer should dispatch");
        assert!(matches!(result.effect, CheatEffect::None));
        assert_eq!(&result.return_data[64..69], b"hello");
    }

    #[test]
    fn unknown_selector_is_a_bad_cheatcode() {
        let tx = TxState::default();
        let data = calldata([0xde, 0xad, 0xbe, 0xef], &[]);
        assert!(matches!(dispatch(&data, &tx, None), Err(VMError::BadCheatCode { .. })));
    }

    #[test]
    fn sign_produces_a_real_signature_distinguishing_inputs() {
        let tx = TxState::default();
        let key = U256::from(1);
        let digest_a = U256::from(0xAAu64);
        let digest_b = U256::from(0xBBu64);
        let data_a = calldata(selectors::SIGN, &[key, digest_a]);
        let data_b = calldata(selectors::SIGN, &[key, digest_b]);
        let result_a = dispatch(&data_a, &tx, None).expect("sign should dispatch");
        let result_b = dispatch(&data_b, &tx, None).expect("sign should dispatch");
        assert_ne!(result_a.return_data, result_b.return_data);
        assert!(result_a.return_data[31] == 27 || result_a.return_data[31] == 28);
        assert_ne!(&result_a.return_data[32..64], &[0u8; 32]);
        assert_ne!(&result_a.return_data[64..96], &[0u8; 32]);
    }

    #[test]
    fn addr_derives_the_matching_address() {
        let tx = TxState::default();
        let key = U256::from(1);
        let data = calldata(selectors::ADDR, &[key]);
        let result = dispatch(&data, &tx, None).expect("addr should dispatch");
        assert_ne!(result.return_data, vec![0u8; 32]);
    }

    fn matches_name(effect: &CheatEffect) -> &'static str {
        match effect {
            CheatEffect::SetTimestamp(_) => "SetTimestamp",
            CheatEffect::SetBlockNumber(_) => "SetBlockNumber",
            CheatEffect::WriteStorage { .. } => "WriteStorage",
            CheatEffect::ReadStorage { .. } => "ReadStorage",
            CheatEffect::None => "None",
        }
    }
}
