//! Re-exports of the 160/256-bit integer and byte-buffer types used
//! throughout the interpreter. Kept in one place so the rest of the crate
//! never imports `ethereum_types` or `bytes` directly.

pub use bytes::Bytes;
pub use ethereum_types::{Address, H256, U256};

/// Number of bytes in an EVM word.
pub const WORD_SIZE: usize = 32;

/// Big-endian encode a `U256` into a 32-byte word.
pub fn word_to_bytes(word: U256) -> [u8; WORD_SIZE] {
    let mut out = [0u8; WORD_SIZE];
    word.to_big_endian(&mut out);
    out
}

/// Low 160 bits of a word, interpreted as an address (as `CALLER`/`ADDRESS`
/// pushes and `word_to_address` conversions throughout the step function
/// do).
pub fn word_to_address(word: U256) -> Address {
    Address::from_slice(&word_to_bytes(word)[12..])
}

/// Left-pad an address out to a full word, as pushed onto the stack.
pub fn address_to_word(address: Address) -> U256 {
    U256::from_big_endian(address.as_bytes())
}
