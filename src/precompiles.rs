//! Precompiled contracts 0x01-0x09 (§4.G).
//!
//! Each precompile is a pure function from input bytes to either an
//! output buffer or a failure; the call protocol in `vm.rs` charges gas
//! computed from [`gas_cost`] before running the body, exactly as it
//! would for any other call target. Grounded on the precompile gas
//! formulas named in `crypto/provider.rs` (`mulmod256`, `modexp`,
//! `blake2_compress`) and the curve libraries the teacher's workspace
//! already depends on for its own precompile implementations.

use crate::constants::FeeSchedule;
use crate::errors::VMError;
use crate::primitives::Address;
use num_bigint::BigUint;
use num_traits::{One, Zero};

pub const ECRECOVER: u64 = 1;
pub const SHA256: u64 = 2;
pub const RIPEMD160: u64 = 3;
pub const IDENTITY: u64 = 4;
pub const MODEXP: u64 = 5;
pub const ECADD: u64 = 6;
pub const ECMUL: u64 = 7;
pub const ECPAIRING: u64 = 8;
pub const BLAKE2F: u64 = 9;

pub fn precompile_number(address: Address) -> Option<u64> {
    let bytes = address.as_bytes();
    if bytes[..19].iter().any(|b| *b != 0) {
        return None;
    }
    let n = u64::from(bytes[19]);
    (1..=9).contains(&n).then_some(n)
}

/// Static gas cost of invoking the precompile at `number` on `input`
/// (§4.G, §6). `ECRECOVER`/`SHA256`/`RIPEMD160`/`IDENTITY` have a linear
/// per-word cost; `MODEXP`/`ECPAIRING`/`BLAKE2F` have formulas keyed off
/// their input shape.
pub fn gas_cost(schedule: &FeeSchedule, number: u64, input: &[u8]) -> u64 {
    let words = crate::gas::words_for(input.len() as u64);
    match number {
        ECRECOVER => 3_000,
        SHA256 => 60 + 12 * words,
        RIPEMD160 => 600 + 120 * words,
        IDENTITY => 15 + 3 * words,
        MODEXP => modexp_gas_cost(input),
        ECADD => schedule.g_ecadd,
        ECMUL => schedule.g_ecmul,
        ECPAIRING => {
            let pairs = (input.len() / 192) as u64;
            schedule.g_pairing_base + schedule.g_pairing_point * pairs
        }
        BLAKE2F => blake2f_rounds(input).map(u64::from).unwrap_or(0) * schedule.g_fround,
        _ => 0,
    }
}

/// Execute the precompile at `number`. Returns `Err(VMError::PrecompileFailure)`
/// on malformed input; a precompile never partially succeeds.
pub fn run(number: u64, input: &[u8]) -> Result<Vec<u8>, VMError> {
    match number {
        ECRECOVER => Ok(ecrecover(input)),
        SHA256 => Ok(sha256(input)),
        RIPEMD160 => Ok(ripemd160(input)),
        IDENTITY => Ok(input.to_vec()),
        MODEXP => modexp(input),
        ECADD => ecadd(input),
        ECMUL => ecmul(input),
        ECPAIRING => ecpairing(input),
        BLAKE2F => blake2f(input),
        _ => Err(VMError::PrecompileFailure),
    }
}

fn padded(input: &[u8], at: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    for i in 0..len {
        if let Some(b) = input.get(at + i) {
            out[i] = *b;
        }
    }
    out
}

fn ecrecover(input: &[u8]) -> Vec<u8> {
    let hash = padded(input, 0, 32);
    let v = padded(input, 32, 32);
    let r = padded(input, 64, 32);
    let s = padded(input, 96, 32);

    if v.iter().take(31).any(|b| *b != 0) {
        return Vec::new();
    }
    let recovery_id = match v[31] {
        27 => 0u8,
        28 => 1u8,
        _ => return Vec::new(),
    };

    let mut sig = [0u8; 64];
    sig[..32].copy_from_slice(&r);
    sig[32..].copy_from_slice(&s);

    let Some(uncompressed) = recover_uncompressed_pubkey(&hash, &sig, recovery_id) else {
        return Vec::new();
    };

    let mut digest_input = Vec::with_capacity(64);
    digest_input.extend_from_slice(&uncompressed[1..]);
    use sha3::{Digest, Keccak256};
    let digest = Keccak256::digest(&digest_input);

    let mut out = vec![0u8; 32];
    out[12..].copy_from_slice(&digest[12..]);
    out
}

/// Recover the uncompressed secp256k1 public key for `ECRECOVER` (§4.G).
///
/// Two backends, selected by the crate's `secp256k1` feature (on by
/// default), mirroring the teacher's own Cargo.toml split: the `secp256k1`
/// crate's libsecp256k1 bindings when enabled, falling back to the pure-Rust
/// `k256` crate otherwise so the precompile still works on targets where
/// linking the C library isn't an option.
#[cfg(feature = "secp256k1")]
fn recover_uncompressed_pubkey(hash: &[u8], sig: &[u8; 64], recovery_id: u8) -> Option<[u8; 65]> {
    let hash: [u8; 32] = hash.try_into().ok()?;
    let recovery_id = secp256k1::ecdsa::RecoveryId::from_i32(i32::from(recovery_id)).ok()?;
    let recoverable = secp256k1::ecdsa::RecoverableSignature::from_compact(sig, recovery_id).ok()?;
    let message = secp256k1::Message::from_digest(hash);
    let public_key = secp256k1::SECP256K1.recover_ecdsa(&message, &recoverable).ok()?;
    Some(public_key.serialize_uncompressed())
}

#[cfg(not(feature = "secp256k1"))]
fn recover_uncompressed_pubkey(hash: &[u8], sig: &[u8; 64], recovery_id: u8) -> Option<[u8; 65]> {
    let signature = k256::ecdsa::Signature::from_slice(sig).ok()?;
    let recovery = k256::ecdsa::RecoveryId::from_byte(recovery_id)?;
    let verifying_key =
        k256::ecdsa::VerifyingKey::recover_from_prehash(hash, &signature, recovery).ok()?;
    let point = verifying_key.to_encoded_point(false);
    point.as_bytes().try_into().ok()
}

fn sha256(input: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    Sha256::digest(input).to_vec()
}

fn ripemd160(input: &[u8]) -> Vec<u8> {
    use ripemd::{Digest, Ripemd160};
    let digest = Ripemd160::digest(input);
    let mut out = vec![0u8; 32];
    out[12..].copy_from_slice(&digest);
    out
}

fn modexp_gas_cost(input: &[u8]) -> u64 {
    let base_len = be_u64(&padded(input, 0, 32));
    let exp_len = be_u64(&padded(input, 32, 32));
    let mod_len = be_u64(&padded(input, 64, 32));

    let base_len = base_len.min(1 << 20);
    let exp_len = exp_len.min(1 << 20);
    let mod_len = mod_len.min(1 << 20);

    let max_len = base_len.max(mod_len);
    let words = max_len.div_ceil(8);
    let multiplication_complexity = words.saturating_mul(words);

    let exp_bytes = padded(input, (96 + base_len) as usize, exp_len as usize);
    let iteration_count = if exp_len <= 32 {
        let e = BigUint::from_bytes_be(&exp_bytes);
        if e.is_zero() {
            0
        } else {
            bit_length(&e).saturating_sub(1)
        }
    } else {
        let head = BigUint::from_bytes_be(&exp_bytes[..32.min(exp_bytes.len())]);
        let extra_bits = 8 * (exp_len - 32);
        if head.is_zero() {
            extra_bits
        } else {
            extra_bits + bit_length(&head).saturating_sub(1)
        }
    };

    (multiplication_complexity.saturating_mul(iteration_count.max(1)) / 3).max(200)
}

fn modexp(input: &[u8]) -> Result<Vec<u8>, VMError> {
    let base_len = be_u64(&padded(input, 0, 32)) as usize;
    let exp_len = be_u64(&padded(input, 32, 32)) as usize;
    let mod_len = be_u64(&padded(input, 64, 32)) as usize;

    let base = BigUint::from_bytes_be(&padded(input, 96, base_len));
    let exponent = BigUint::from_bytes_be(&padded(input, 96 + base_len, exp_len));
    let modulus = BigUint::from_bytes_be(&padded(input, 96 + base_len + exp_len, mod_len));

    let result = if modulus.is_zero() {
        BigUint::zero()
    } else {
        base.modpow(&exponent, &modulus)
    };

    let mut out = result.to_bytes_be();
    if out.len() < mod_len {
        let mut padded_out = vec![0u8; mod_len - out.len()];
        padded_out.append(&mut out);
        out = padded_out;
    }
    Ok(out)
}

fn bit_length(n: &BigUint) -> u64 {
    n.bits()
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[24..32]);
    u64::from_be_bytes(buf)
}

fn ecadd(input: &[u8]) -> Result<Vec<u8>, VMError> {
    use ark_ec::AffineRepr;

    let p1 = bn254_point(&padded(input, 0, 64))?;
    let p2 = bn254_point(&padded(input, 64, 64))?;
    let sum = (p1 + p2).into_affine();
    Ok(encode_point(sum))
}

fn ecmul(input: &[u8]) -> Result<Vec<u8>, VMError> {
    use ark_bn254::G1Affine;
    use ark_ec::AffineRepr;

    let p = bn254_point(&padded(input, 0, 64))?;
    let scalar_bytes = padded(input, 64, 32);
    let scalar = BigUint::from_bytes_be(&scalar_bytes);
    let product = (p * bn254_scalar(&scalar)).into_affine();
    Ok(encode_point(product))
}

fn ecpairing(input: &[u8]) -> Result<Vec<u8>, VMError> {
    use ark_bn254::{Bn254, G1Affine, G2Affine};
    use ark_ec::pairing::Pairing;
    use ark_ff::One as ArkOne;

    if !input.len().is_multiple_of(192) {
        return Err(VMError::PrecompileFailure);
    }
    let mut accum = <Bn254 as Pairing>::TargetField::one();
    for chunk in input.chunks(192) {
        let g1 = bn254_point(&chunk[0..64])?;
        let g2 = bn254_g2_point(&chunk[64..192])?;
        accum *= Bn254::pairing(g1, g2).0;
    }
    let success = accum == <Bn254 as Pairing>::TargetField::one();
    let mut out = vec![0u8; 32];
    if success {
        out[31] = 1;
    }
    Ok(out)
}

fn bn254_point(bytes: &[u8]) -> Result<ark_bn254::G1Affine, VMError> {
    use ark_bn254::{Fq, G1Affine};
    use ark_ff::PrimeField;
    let x = Fq::from_be_bytes_mod_order(&bytes[0..32]);
    let y = Fq::from_be_bytes_mod_order(&bytes[32..64]);
    if x.0.is_zero() && y.0.is_zero() {
        return Ok(G1Affine::identity());
    }
    G1Affine::new_unchecked(x, y)
        .is_on_curve()
        .then(|| G1Affine::new_unchecked(x, y))
        .ok_or(VMError::PrecompileFailure)
}

fn bn254_g2_point(bytes: &[u8]) -> Result<ark_bn254::G2Affine, VMError> {
    use ark_bn254::{Fq, Fq2, G2Affine};
    use ark_ff::PrimeField;
    let x_c1 = Fq::from_be_bytes_mod_order(&bytes[0..32]);
    let x_c0 = Fq::from_be_bytes_mod_order(&bytes[32..64]);
    let y_c1 = Fq::from_be_bytes_mod_order(&bytes[64..96]);
    let y_c0 = Fq::from_be_bytes_mod_order(&bytes[96..128]);
    let x = Fq2::new(x_c0, x_c1);
    let y = Fq2::new(y_c0, y_c1);
    let point = G2Affine::new_unchecked(x, y);
    point.is_on_curve().then_some(point).ok_or(VMError::PrecompileFailure)
}

fn bn254_scalar(n: &BigUint) -> ark_bn254::Fr {
    use ark_ff::PrimeField;
    ark_bn254::Fr::from_be_bytes_mod_order(&n.to_bytes_be())
}

fn encode_point(point: ark_bn254::G1Affine) -> Vec<u8> {
    use ark_ec::AffineRepr;
    use ark_ff::{BigInteger, PrimeField};
    let mut out = vec![0u8; 64];
    if let Some((x, y)) = point.xy() {
        let x_bytes = x.into_bigint().to_bytes_be();
        let y_bytes = y.into_bigint().to_bytes_be();
        out[32 - x_bytes.len()..32].copy_from_slice(&x_bytes);
        out[64 - y_bytes.len()..64].copy_from_slice(&y_bytes);
    }
    out
}

/// BLAKE2b's `F` compression function (§4.G). No published crate exposes
/// the raw compression step with an arbitrary round count the way
/// `BLAKE2F` needs, so this is a direct implementation of RFC 7693 §3.2.
fn blake2f_rounds(input: &[u8]) -> Option<u32> {
    if input.len() != 213 {
        return None;
    }
    Some(u32::from_be_bytes(input[0..4].try_into().ok()?))
}

fn blake2f(input: &[u8]) -> Result<Vec<u8>, VMError> {
    if input.len() != 213 {
        return Err(VMError::PrecompileFailure);
    }
    let rounds = u32::from_be_bytes(input[0..4].try_into().unwrap_or_default());
    let mut h = [0u64; 8];
    for (i, slot) in h.iter_mut().enumerate() {
        *slot = u64::from_le_bytes(input[4 + i * 8..12 + i * 8].try_into().unwrap_or_default());
    }
    let mut m = [0u64; 16];
    for (i, slot) in m.iter_mut().enumerate() {
        *slot = u64::from_le_bytes(input[68 + i * 8..76 + i * 8].try_into().unwrap_or_default());
    }
    let mut t = [0u64; 2];
    t[0] = u64::from_le_bytes(input[196..204].try_into().unwrap_or_default());
    t[1] = u64::from_le_bytes(input[204..212].try_into().unwrap_or_default());
    let last_block = match input[212] {
        0 => false,
        1 => true,
        _ => return Err(VMError::PrecompileFailure),
    };

    blake2b_f(&mut h, &m, &t, last_block, rounds);

    let mut out = Vec::with_capacity(64);
    for word in h {
        out.extend_from_slice(&word.to_le_bytes());
    }
    Ok(out)
}

const IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

fn blake2b_f(h: &mut [u64; 8], m: &[u64; 16], t: &[u64; 2], last: bool, rounds: u32) {
    let mut v = [0u64; 16];
    v[..8].copy_from_slice(h);
    v[8..].copy_from_slice(&IV);
    v[12] ^= t[0];
    v[13] ^= t[1];
    if last {
        v[14] = !v[14];
    }

    for round in 0..rounds {
        let s = &SIGMA[(round as usize) % 10];
        g(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        g(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        g(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        g(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        g(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        g(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        g(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        g(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

fn g(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_returns_input_verbatim() {
        assert_eq!(run(IDENTITY, b"hello").unwrap(), b"hello".to_vec());
    }

    #[test]
    fn sha256_matches_known_digest() {
        let out = run(SHA256, b"").unwrap();
        assert_eq!(
            hex::encode(out),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn precompile_number_detects_only_canonical_low_byte_addresses() {
        assert_eq!(precompile_number(Address::from_low_u64_be(1)), Some(1));
        assert_eq!(precompile_number(Address::from_low_u64_be(9)), Some(9));
        assert_eq!(precompile_number(Address::from_low_u64_be(10)), None);
        assert_eq!(precompile_number(Address::from_low_u64_be(0)), None);
    }

    #[test]
    fn blake2f_round_count_is_read_from_input_header() {
        let mut input = vec![0u8; 213];
        input[0..4].copy_from_slice(&12u32.to_be_bytes());
        assert_eq!(blake2f_rounds(&input), Some(12));
    }
}
