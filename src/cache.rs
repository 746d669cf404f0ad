//! Fetched-state cache (§3 "Cache", §9 Open Questions).
//!
//! Caches contracts and storage slots fetched via `Query::PleaseFetchContract`
//! / `Query::PleaseFetchSlot` so a branch that re-enters the same address
//! doesn't re-suspend. The upstream interpreter this specification is
//! distilled from left `unifyCachedStorage`/`unifyCachedContract`
//! unimplemented (both were `error "unfinished"` stubs); this crate
//! resolves that Open Question by implementing them as a right-biased
//! union merge — see `DESIGN.md`.

use crate::contract::Contract;
use crate::primitives::{Address, U256};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Cache {
    pub fetched_contracts: HashMap<Address, Contract>,
    pub fetched_storage: HashMap<(Address, U256), U256>,
    /// Addresses currently under a `PleaseFetchContract` suspension, to
    /// detect a second identical query arriving before the first
    /// resolves (shouldn't happen in a single-threaded driver, but
    /// guarding it turns a silent duplicate suspend into a visible bug).
    pub path: Vec<Address>,
}

impl Cache {
    pub fn new() -> Cache {
        Cache::default()
    }

    pub fn contract(&self, address: Address) -> Option<&Contract> {
        self.fetched_contracts.get(&address)
    }

    pub fn insert_contract(&mut self, address: Address, contract: Contract) {
        self.fetched_contracts.insert(address, contract);
    }

    pub fn storage_slot(&self, address: Address, slot: U256) -> Option<U256> {
        self.fetched_storage.get(&(address, slot)).copied()
    }

    pub fn insert_storage_slot(&mut self, address: Address, slot: U256, value: U256) {
        self.fetched_storage.insert((address, slot), value);
    }

    /// Merge another cache into this one after a branch resolves (§9):
    /// the branch that actually ran owns authoritative values for
    /// anything it fetched, so `other` wins on key collisions. Neither
    /// side is ever allowed to silently drop fetched data.
    pub fn unify_cached_contract(&mut self, other: &Cache) {
        for (address, contract) in &other.fetched_contracts {
            self.fetched_contracts.insert(*address, contract.clone());
        }
    }

    pub fn unify_cached_storage(&mut self, other: &Cache) {
        for (key, value) in &other.fetched_storage {
            self.fetched_storage.insert(*key, *value);
        }
    }

    /// Merge both contract and storage caches in one call, the shape the
    /// branch-resolution driver actually needs (§4.H).
    pub fn unify(&mut self, other: &Cache) {
        self.unify_cached_contract(other);
        self.unify_cached_storage(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::CodeKind;
    use crate::primitives::Bytes;

    #[test]
    fn unify_merges_storage_without_dropping_either_side() {
        let mut a = Cache::new();
        let mut b = Cache::new();
        let addr = Address::repeat_byte(1);
        a.insert_storage_slot(addr, U256::from(1), U256::from(100));
        b.insert_storage_slot(addr, U256::from(2), U256::from(200));
        a.unify(&b);
        assert_eq!(a.storage_slot(addr, U256::from(1)), Some(U256::from(100)));
        assert_eq!(a.storage_slot(addr, U256::from(2)), Some(U256::from(200)));
    }

    #[test]
    fn unify_is_right_biased_on_collision() {
        let mut a = Cache::new();
        let mut b = Cache::new();
        let addr = Address::repeat_byte(2);
        a.insert_contract(
            addr,
            Contract::new(Bytes::from(vec![0x00]), CodeKind::RuntimeCode, true).unwrap(),
        );
        b.insert_contract(
            addr,
            Contract::new(Bytes::from(vec![0x00, 0x00]), CodeKind::RuntimeCode, true).unwrap(),
        );
        a.unify_cached_contract(&b);
        assert_eq!(a.contract(addr).unwrap().len(), 2);
    }
}
