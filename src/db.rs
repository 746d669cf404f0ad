//! Backing store abstraction (§3 implies an external store the `Cache`
//! fronts; no blockchain persistence is in scope per spec Non-goals, but
//! the call/create protocol still needs *some* account/storage lookup
//! surface to fetch from). Grounded on the `Database` trait object used
//! by `lambdaclass-ethrex`'s levm crate to decouple the interpreter from
//! any particular storage engine.

use crate::contract::{CodeKind, Contract};
use crate::primitives::{Address, U256};
use std::collections::HashMap;

/// An account's externally-visible fields, as the `Database` returns them
/// (§3). `None` balance/nonce/code means the account does not exist.
#[derive(Debug, Clone, Default)]
pub struct AccountInfo {
    pub balance: U256,
    pub nonce: u64,
    pub code: Vec<u8>,
}

/// The read surface the call/create protocol needs when a `Frame` asks
/// for an account or slot it doesn't yet have cached (§4.H
/// `Query::PleaseFetchContract`/`PleaseFetchSlot`).
///
/// A real embedding (hooked up to a node's state trie, a forked RPC
/// provider, etc.) implements this trait; [`InMemoryDatabase`] below is
/// the reference implementation used by tests and examples.
pub trait Database {
    fn account_info(&self, address: Address) -> Option<AccountInfo>;
    fn storage(&self, address: Address, slot: U256) -> U256;
    fn exists(&self, address: Address) -> bool {
        self.account_info(address).is_some()
    }
    /// Whether `account_info`/`storage` are backed by something that can't
    /// be called synchronously from inside the driver loop (an RPC-forked
    /// node, say). When `true`, the `VM` suspends with
    /// `Query::PleaseFetchContract`/`PleaseFetchSlot` on a cache miss
    /// instead of calling into this trait directly (§4.H); the embedding
    /// answers out-of-band and resumes via `VM::resolve_fetch_*`.
    /// Defaults to `false`, preserving [`InMemoryDatabase`]'s synchronous
    /// behavior.
    fn is_remote(&self) -> bool {
        false
    }
}

/// A simple in-memory `Database`, useful for unit tests and for driving
/// the interpreter over a small hand-built world without a real node
/// behind it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    accounts: HashMap<Address, AccountInfo>,
    storage: HashMap<(Address, U256), U256>,
}

impl InMemoryDatabase {
    pub fn new() -> InMemoryDatabase {
        InMemoryDatabase::default()
    }

    pub fn set_account(&mut self, address: Address, info: AccountInfo) {
        self.accounts.insert(address, info);
    }

    pub fn set_storage(&mut self, address: Address, slot: U256, value: U256) {
        self.storage.insert((address, slot), value);
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.accounts.entry(address).or_default().balance = balance;
    }

    pub fn contract_of(&self, address: Address) -> Option<Contract> {
        let info = self.accounts.get(&address)?;
        Contract::new(info.code.clone().into(), CodeKind::RuntimeCode, true).ok()
    }
}

impl Database for InMemoryDatabase {
    fn account_info(&self, address: Address) -> Option<AccountInfo> {
        self.accounts.get(&address).cloned()
    }

    fn storage(&self, address: Address, slot: U256) -> U256 {
        self.storage
            .get(&(address, slot))
            .copied()
            .unwrap_or(U256::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_reads_as_absent() {
        let db = InMemoryDatabase::new();
        assert!(db.account_info(Address::repeat_byte(9)).is_none());
        assert!(!db.exists(Address::repeat_byte(9)));
    }

    #[test]
    fn unset_storage_reads_as_zero() {
        let db = InMemoryDatabase::new();
        assert_eq!(
            db.storage(Address::repeat_byte(1), U256::from(7)),
            U256::zero()
        );
    }
}
