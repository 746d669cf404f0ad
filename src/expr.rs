//! The symbolic/concrete value & buffer layer (§3 "Symbolic word `W`",
//! `Buf`, `Store`; §6 "Value layer contract"; §9 "Polymorphic expression
//! tree").
//!
//! The distilled specification treats this layer as an external
//! collaborator — a separate `Expr` package the interpreter calls into
//! opaquely. No such crate is published, so it lives here as a
//! self-contained module implementing exactly the interface contract named
//! in §6: constructors that fold to a literal whenever every operand is
//! literal, and stay symbolic otherwise. Nothing outside this module
//! matches on `Expr`/`Buf`/`Store` variants directly — callers go through
//! `ops`.

use crate::primitives::{word_to_bytes, Bytes, U256, WORD_SIZE};
use std::fmt;

/// A 256-bit EVM word: either a literal or a symbolic constructor term
/// (§3 "Symbolic word `W`").
#[derive(Clone, PartialEq, Eq)]
pub enum Expr {
    Lit(U256),
    /// A free symbolic word, identified by a name (e.g. a calldata
    /// argument the driver never concretized).
    Abstract(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    SDiv(Box<Expr>, Box<Expr>),
    Mod(Box<Expr>, Box<Expr>),
    SMod(Box<Expr>, Box<Expr>),
    AddMod(Box<Expr>, Box<Expr>, Box<Expr>),
    MulMod(Box<Expr>, Box<Expr>, Box<Expr>),
    Exp(Box<Expr>, Box<Expr>),
    SignExtend(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    SLt(Box<Expr>, Box<Expr>),
    SGt(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    IsZero(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Byte(Box<Expr>, Box<Expr>),
    Shl(Box<Expr>, Box<Expr>),
    Shr(Box<Expr>, Box<Expr>),
    Sar(Box<Expr>, Box<Expr>),
    Keccak(Box<Buf>),
    ReadWord(Box<Expr>, Box<Buf>),
    BufLength(Box<Buf>),
    SLoad(Box<Expr>, Box<Expr>, Box<Store>),
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(w) => write!(f, "{w:#x}"),
            Expr::Abstract(name) => write!(f, "<{name}>"),
            _ => write!(f, "<symbolic expr>"),
        }
    }
}

/// A symbolic byte buffer (§3 "Buf"): concrete bytes, an abstract name, or
/// a tree of writes/copies.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Buf {
    Concrete(Bytes),
    Abstract(String),
    WriteWord {
        offset: Box<Expr>,
        value: Box<Expr>,
        base: Box<Buf>,
    },
    WriteByte {
        offset: Box<Expr>,
        value: Box<Expr>,
        base: Box<Buf>,
    },
    CopySlice {
        dst_offset: Box<Expr>,
        src_offset: Box<Expr>,
        size: Box<Expr>,
        src: Box<Buf>,
        dst: Box<Buf>,
    },
}

/// A unified symbolic/concrete storage expression (§3 "Store").
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum Store {
    #[default]
    Empty,
    Abstract,
    Write {
        addr: Box<Expr>,
        slot: Box<Expr>,
        value: Box<Expr>,
        base: Box<Store>,
    },
}

impl Expr {
    pub fn lit(v: impl Into<U256>) -> Expr {
        Expr::Lit(v.into())
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Expr::Lit(_))
    }

    /// Convert back to a literal where possible (§3: "calls into the
    /// external value layer for ... conversion back to literal where
    /// possible").
    pub fn as_lit(&self) -> Option<U256> {
        match self {
            Expr::Lit(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<U256> for Expr {
    fn from(v: U256) -> Self {
        Expr::Lit(v)
    }
}

impl From<u64> for Expr {
    fn from(v: u64) -> Self {
        Expr::Lit(U256::from(v))
    }
}

/// The value-layer contract named in §6: arithmetic/comparison/indexing
/// operations that fold to literals whenever every operand is literal.
pub mod ops {
    use super::*;

    macro_rules! bin_fold {
        ($name:ident, $variant:ident, $lit_op:expr) => {
            pub fn $name(a: Expr, b: Expr) -> Expr {
                if let (Some(x), Some(y)) = (a.as_lit(), b.as_lit()) {
                    Expr::Lit($lit_op(x, y))
                } else {
                    Expr::$variant(Box::new(a), Box::new(b))
                }
            }
        };
    }

    bin_fold!(add, Add, |x: U256, y: U256| x.overflowing_add(y).0);
    bin_fold!(sub, Sub, |x: U256, y: U256| x.overflowing_sub(y).0);
    bin_fold!(mul, Mul, |x: U256, y: U256| x.overflowing_mul(y).0);
    bin_fold!(div, Div, |x: U256, y: U256| if y.is_zero() {
        U256::zero()
    } else {
        x / y
    });
    bin_fold!(sdiv, SDiv, |x: U256, y: U256| sdiv_lit(x, y));
    bin_fold!(rem, Mod, |x: U256, y: U256| if y.is_zero() {
        U256::zero()
    } else {
        x % y
    });
    bin_fold!(srem, SMod, |x: U256, y: U256| smod_lit(x, y));
    bin_fold!(lt, Lt, |x: U256, y: U256| bool_word(x < y));
    bin_fold!(gt, Gt, |x: U256, y: U256| bool_word(x > y));
    bin_fold!(slt, SLt, |x: U256, y: U256| bool_word(signed_lt(x, y)));
    bin_fold!(sgt, SGt, |x: U256, y: U256| bool_word(signed_lt(y, x)));
    bin_fold!(eq, Eq, |x: U256, y: U256| bool_word(x == y));
    bin_fold!(bitand, And, |x: U256, y: U256| x & y);
    bin_fold!(bitor, Or, |x: U256, y: U256| x | y);
    bin_fold!(bitxor, Xor, |x: U256, y: U256| x ^ y);
    bin_fold!(shl, Shl, |x: U256, y: U256| shl_lit(x, y));
    bin_fold!(shr, Shr, |x: U256, y: U256| shr_lit(x, y));
    bin_fold!(sar, Sar, |x: U256, y: U256| sar_lit(x, y));

    pub fn iszero(a: Expr) -> Expr {
        match a.as_lit() {
            Some(x) => Expr::Lit(bool_word(x.is_zero())),
            None => Expr::IsZero(Box::new(a)),
        }
    }

    pub fn not(a: Expr) -> Expr {
        match a.as_lit() {
            Some(x) => Expr::Lit(!x),
            None => Expr::Not(Box::new(a)),
        }
    }

    pub fn addmod(a: Expr, b: Expr, m: Expr) -> Expr {
        match (a.as_lit(), b.as_lit(), m.as_lit()) {
            (Some(x), Some(y), Some(n)) => Expr::Lit(addmod_lit(x, y, n)),
            _ => Expr::AddMod(Box::new(a), Box::new(b), Box::new(m)),
        }
    }

    pub fn mulmod(a: Expr, b: Expr, m: Expr) -> Expr {
        match (a.as_lit(), b.as_lit(), m.as_lit()) {
            (Some(x), Some(y), Some(n)) => Expr::Lit(mulmod_lit(x, y, n)),
            _ => Expr::MulMod(Box::new(a), Box::new(b), Box::new(m)),
        }
    }

    pub fn exp(base: Expr, exponent: Expr) -> Expr {
        match (base.as_lit(), exponent.as_lit()) {
            (Some(b), Some(e)) => Expr::Lit(exp_lit(b, e)),
            _ => Expr::Exp(Box::new(base), Box::new(exponent)),
        }
    }

    pub fn signextend(byte_index: Expr, value: Expr) -> Expr {
        match (byte_index.as_lit(), value.as_lit()) {
            (Some(i), Some(v)) => Expr::Lit(signextend_lit(i, v)),
            _ => Expr::SignExtend(Box::new(byte_index), Box::new(value)),
        }
    }

    pub fn byte(index: Expr, value: Expr) -> Expr {
        match (index.as_lit(), value.as_lit()) {
            (Some(i), Some(v)) => Expr::Lit(byte_lit(i, v)),
            _ => Expr::Byte(Box::new(index), Box::new(value)),
        }
    }

    pub fn keccak(buf: Buf) -> Expr {
        match as_concrete_bytes(&buf) {
            Some(bytes) => {
                use sha3::{Digest, Keccak256};
                Expr::Lit(U256::from_big_endian(&Keccak256::digest(bytes)))
            }
            None => Expr::Keccak(Box::new(buf)),
        }
    }

    /// `bufLength(Buf) -> W`.
    pub fn buf_length(buf: &Buf) -> Expr {
        match buf {
            Buf::Concrete(b) => Expr::Lit(U256::from(b.len())),
            other => Expr::BufLength(Box::new(other.clone())),
        }
    }

    /// `readWord(offset, Buf) -> W`.
    pub fn read_word(offset: U256, buf: &Buf) -> Expr {
        match as_concrete_bytes(buf) {
            Some(bytes) => {
                let off = match usize::try_from(offset) {
                    Ok(o) => o,
                    Err(_) => return Expr::Lit(U256::zero()),
                };
                let mut word = [0u8; WORD_SIZE];
                for (i, slot) in word.iter_mut().enumerate() {
                    *slot = *bytes.get(off + i).unwrap_or(&0);
                }
                Expr::Lit(U256::from_big_endian(&word))
            }
            None => Expr::ReadWord(Box::new(Expr::Lit(offset)), Box::new(buf.clone())),
        }
    }

    /// `readBytes(n, off, Buf) -> W` (right-padded with zero bytes, packed
    /// into the low-order bytes of a word — used by `CALLDATALOAD` at the
    /// tail of calldata and by `PUSHn`).
    pub fn read_bytes(n: usize, offset: usize, buf: &Buf) -> Expr {
        match as_concrete_bytes(buf) {
            Some(bytes) => {
                let mut word = [0u8; WORD_SIZE];
                for i in 0..n.min(WORD_SIZE) {
                    word[WORD_SIZE - n + i] = *bytes.get(offset + i).unwrap_or(&0);
                }
                Expr::Lit(U256::from_big_endian(&word))
            }
            None => Expr::ReadWord(Box::new(Expr::Lit(U256::from(offset))), Box::new(buf.clone())),
        }
    }

    /// `writeWord(offset, value, Buf) -> Buf`.
    pub fn write_word(offset: Expr, value: Expr, base: Buf) -> Buf {
        if let (Some(off), Buf::Concrete(bytes)) = (offset.as_lit(), &base) {
            if let (Ok(off), Some(val)) = (usize::try_from(off), value.as_lit()) {
                if off.saturating_add(WORD_SIZE) <= isize::MAX as usize {
                    let mut out = bytes.to_vec();
                    if out.len() < off + WORD_SIZE {
                        out.resize(off + WORD_SIZE, 0);
                    }
                    out[off..off + WORD_SIZE].copy_from_slice(&word_to_bytes(val));
                    return Buf::Concrete(Bytes::from(out));
                }
            }
        }
        Buf::WriteWord {
            offset: Box::new(offset),
            value: Box::new(value),
            base: Box::new(base),
        }
    }

    /// `writeByte(offset, value, Buf) -> Buf`.
    pub fn write_byte(offset: Expr, value: Expr, base: Buf) -> Buf {
        if let (Some(off), Buf::Concrete(bytes), Some(val)) = (offset.as_lit(), &base, value.as_lit())
        {
            if let Ok(off) = usize::try_from(off) {
                let mut out = bytes.to_vec();
                if out.len() <= off {
                    out.resize(off + 1, 0);
                }
                out[off] = val.byte(0);
                return Buf::Concrete(Bytes::from(out));
            }
        }
        Buf::WriteByte {
            offset: Box::new(offset),
            value: Box::new(value),
            base: Box::new(base),
        }
    }

    /// `copySlice(dst_off, src_off, size, src, dst) -> Buf`.
    pub fn copy_slice(dst_offset: Expr, src_offset: Expr, size: Expr, src: Buf, dst: Buf) -> Buf {
        if let (Some(d), Some(s), Some(n), Buf::Concrete(src_bytes), Buf::Concrete(dst_bytes)) =
            (dst_offset.as_lit(), src_offset.as_lit(), size.as_lit(), &src, &dst)
        {
            if let (Ok(d), Ok(s), Ok(n)) = (usize::try_from(d), usize::try_from(s), usize::try_from(n))
            {
                let mut out = dst_bytes.to_vec();
                if out.len() < d + n {
                    out.resize(d + n, 0);
                }
                for i in 0..n {
                    out[d + i] = *src_bytes.get(s + i).unwrap_or(&0);
                }
                return Buf::Concrete(Bytes::from(out));
            }
        }
        Buf::CopySlice {
            dst_offset: Box::new(dst_offset),
            src_offset: Box::new(src_offset),
            size: Box::new(size),
            src: Box::new(src),
            dst: Box::new(dst),
        }
    }

    /// `fromList(sequence<B>) -> Buf`.
    pub fn from_list(bytes: Vec<u8>) -> Buf {
        Buf::Concrete(Bytes::from(bytes))
    }

    /// `toList(Buf) -> Option<sequence<B>>`.
    pub fn to_list(buf: &Buf) -> Option<Vec<u8>> {
        as_concrete_bytes(buf).map(|b| b.to_vec())
    }

    /// `concPrefix(Buf) -> Option<int>`: length of the longest fully
    /// literal prefix. Every buffer this crate constructs is either fully
    /// concrete or fully abstract, so the prefix is either the whole
    /// buffer or nothing.
    pub fn conc_prefix(buf: &Buf) -> Option<usize> {
        as_concrete_bytes(buf).map(|b| b.len())
    }

    fn as_concrete_bytes(buf: &Buf) -> Option<Bytes> {
        match buf {
            Buf::Concrete(b) => Some(b.clone()),
            _ => None,
        }
    }

    /// `readStorage(addr, slot, Store) -> Option<W>`.
    pub fn read_storage(addr: &Expr, slot: &Expr, store: &Store) -> Option<Expr> {
        match store {
            Store::Empty => Some(Expr::Lit(U256::zero())),
            Store::Abstract => None,
            Store::Write {
                addr: a,
                slot: s,
                value,
                base,
            } => {
                if a.as_ref() == addr && s.as_ref() == slot {
                    Some(value.as_ref().clone())
                } else if a.as_lit().is_some() && addr.as_lit().is_some() && s.as_lit().is_some() && slot.as_lit().is_some() {
                    // Both concrete and definitely distinct: keep walking.
                    read_storage(addr, slot, base)
                } else {
                    // Possible aliasing with a symbolic address/slot: give up.
                    None
                }
            }
        }
    }

    /// `writeStorage(addr, slot, val, Store) -> Store`.
    pub fn write_storage(addr: Expr, slot: Expr, value: Expr, base: Store) -> Store {
        Store::Write {
            addr: Box::new(addr),
            slot: Box::new(slot),
            value: Box::new(value),
            base: Box::new(base),
        }
    }

    fn bool_word(b: bool) -> U256 {
        if b {
            U256::one()
        } else {
            U256::zero()
        }
    }

    /// Two's-complement sign bit (bit 255).
    fn is_negative(x: U256) -> bool {
        x.bit(255)
    }

    fn negate(x: U256) -> U256 {
        (!x).overflowing_add(U256::one()).0
    }

    fn abs(x: U256) -> U256 {
        if is_negative(x) {
            negate(x)
        } else {
            x
        }
    }

    fn to_signed(x: U256) -> (bool, U256) {
        (is_negative(x), abs(x))
    }

    /// Numbers of the same sign order identically whether compared as
    /// two's-complement bit patterns or as signed magnitudes, so only the
    /// mixed-sign case needs special handling.
    fn signed_lt(x: U256, y: U256) -> bool {
        match (is_negative(x), is_negative(y)) {
            (true, false) => true,
            (false, true) => false,
            _ => x < y,
        }
    }

    fn sdiv_lit(x: U256, y: U256) -> U256 {
        if y.is_zero() {
            return U256::zero();
        }
        let min_i256 = U256::one() << 255;
        if x == min_i256 && y == U256::MAX {
            // -1 in two's complement; EVM defines MIN_I256 / -1 == MIN_I256.
            return min_i256;
        }
        let negative = is_negative(x) != is_negative(y);
        let quotient = abs(x) / abs(y);
        if negative {
            negate(quotient)
        } else {
            quotient
        }
    }

    fn smod_lit(x: U256, y: U256) -> U256 {
        if y.is_zero() {
            return U256::zero();
        }
        let remainder = abs(x) % abs(y);
        if is_negative(x) {
            negate(remainder)
        } else {
            remainder
        }
    }

    fn addmod_lit(x: U256, y: U256, m: U256) -> U256 {
        if m.is_zero() {
            return U256::zero();
        }
        use ethereum_types::U512;
        let sum = U512::from(x) + U512::from(y);
        let (_, rem) = sum.div_mod(m.into());
        rem.try_into().unwrap_or(U256::zero())
    }

    fn mulmod_lit(x: U256, y: U256, m: U256) -> U256 {
        if m.is_zero() {
            return U256::zero();
        }
        let (_, rem) = x.full_mul(y).div_mod(m.into());
        rem.try_into().unwrap_or(U256::zero())
    }

    fn shl_lit(value: U256, shift: U256) -> U256 {
        if shift >= U256::from(256) {
            U256::zero()
        } else {
            value << shift.as_usize()
        }
    }

    fn shr_lit(value: U256, shift: U256) -> U256 {
        if shift >= U256::from(256) {
            U256::zero()
        } else {
            value >> shift.as_usize()
        }
    }

    fn sar_lit(value: U256, shift: U256) -> U256 {
        let (negative, _) = to_signed(value);
        if shift >= U256::from(256) {
            return if negative { U256::MAX } else { U256::zero() };
        }
        let shift = shift.as_usize();
        let shifted = value >> shift;
        if negative && shift > 0 {
            let fill = U256::MAX << (256 - shift);
            shifted | fill
        } else {
            shifted
        }
    }

    /// `U256::pow` panics on overflow (like the rest of the `uint`-derived
    /// arithmetic this module avoids calling directly); EVM's `EXP`
    /// wraps modulo 2^256, so this does square-and-multiply with
    /// `overflowing_mul` instead.
    fn exp_lit(base: U256, exponent: U256) -> U256 {
        let mut result = U256::one();
        let mut base = base;
        let mut exponent = exponent;
        while !exponent.is_zero() {
            if exponent.bit(0) {
                result = result.overflowing_mul(base).0;
            }
            base = base.overflowing_mul(base).0;
            exponent >>= 1;
        }
        result
    }

    fn signextend_lit(byte_index: U256, value: U256) -> U256 {
        if byte_index >= U256::from(32) {
            return value;
        }
        let byte_index = byte_index.low_u32() as usize;
        let sign_bit_index = 8 * byte_index + 7;
        let mut bytes = word_to_bytes(value);
        // `bytes` is big-endian; the sign bit lives in byte
        // `31 - byte_index`.
        let sign_byte_pos = 31 - byte_index;
        let is_negative = bytes[sign_byte_pos] & 0x80 != 0;
        for b in bytes.iter_mut().take(sign_byte_pos) {
            *b = if is_negative { 0xff } else { 0x00 };
        }
        let _ = sign_bit_index;
        U256::from_big_endian(&bytes)
    }

    fn byte_lit(index: U256, value: U256) -> U256 {
        if index >= U256::from(32) {
            return U256::zero();
        }
        let index = index.low_u32() as usize;
        U256::from(word_to_bytes(value)[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::U256;

    #[test]
    fn add_folds_literals() {
        let e = ops::add(Expr::lit(U256::from(1)), Expr::lit(U256::from(1)));
        assert_eq!(e.as_lit(), Some(U256::from(2)));
    }

    #[test]
    fn add_stays_symbolic_with_abstract_operand() {
        let e = ops::add(Expr::lit(U256::from(1)), Expr::Abstract("x".into()));
        assert!(e.as_lit().is_none());
    }

    #[test]
    fn sdiv_matches_evm_semantics() {
        // -1 / 1 == -1, and division by zero is zero.
        let neg_one = Expr::lit(U256::MAX);
        let one = Expr::lit(U256::one());
        assert_eq!(ops::sdiv(neg_one.clone(), one).as_lit(), Some(U256::MAX));
        assert_eq!(
            ops::sdiv(neg_one, Expr::lit(U256::zero())).as_lit(),
            Some(U256::zero())
        );
    }

    #[test]
    fn sar_fills_with_sign_bit() {
        let minus_one = Expr::lit(U256::MAX);
        let shifted = ops::sar(minus_one, Expr::lit(U256::from(4)));
        assert_eq!(shifted.as_lit(), Some(U256::MAX));
    }

    #[test]
    fn write_word_then_read_word_round_trips_on_concrete_buffers() {
        let base = Buf::Concrete(Bytes::from(vec![0u8; 32]));
        let written = ops::write_word(Expr::lit(U256::zero()), Expr::lit(U256::from(42)), base);
        let read = ops::read_word(U256::zero(), &written);
        assert_eq!(read.as_lit(), Some(U256::from(42)));
    }

    #[test]
    fn exp_wraps_instead_of_panicking_on_overflow() {
        let base = Expr::lit(U256::from(2));
        let exponent = Expr::lit(U256::from(256u64));
        assert_eq!(ops::exp(base, exponent).as_lit(), Some(U256::zero()));
    }

    #[test]
    fn conc_prefix_is_none_for_abstract_buffers() {
        let buf = Buf::Abstract("calldata".into());
        assert_eq!(ops::conc_prefix(&buf), None);
    }
}
