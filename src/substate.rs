//! Transaction-scoped substate (§3 "SubState", invariant 7).
//!
//! Tracks everything that must be rolled back on a frame revert but
//! survives across the transaction as a whole: self-destructs queued,
//! touched accounts (EIP-161), and the EIP-2929 warm-access sets. A
//! snapshot/restore pair backs the call/create revert protocol (§4.F).

use crate::primitives::{Address, U256};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct SubState {
    /// Accounts queued for deletion at the end of the transaction
    /// (`SELFDESTRUCT`, §4.F). Post-Cancun semantics (deletion only when
    /// the account was created in the same transaction) are not modeled;
    /// this crate always schedules unconditional deletion, matching the
    /// London-era behavior named in §6.
    pub selfdestructs: HashSet<Address>,
    /// EIP-161 "touched" accounts: zero-value calls/transfers to an
    /// account mark it touched even if nothing else about it changes.
    pub touched: HashSet<Address>,
    pub accessed_addresses: HashSet<Address>,
    pub accessed_storage_keys: HashSet<(Address, U256)>,
    /// Running gas refund counter for this transaction (EIP-2200/3529).
    pub refund_counter: u64,
}

impl SubState {
    pub fn new() -> SubState {
        SubState::default()
    }

    /// Returns `true` if this is the first time `address` is touched in
    /// this transaction, and marks it accessed either way (EIP-2929).
    pub fn access_address(&mut self, address: Address) -> bool {
        self.accessed_addresses.insert(address)
    }

    pub fn access_storage_key(&mut self, address: Address, key: U256) -> bool {
        self.accessed_storage_keys.insert((address, key))
    }

    pub fn touch(&mut self, address: Address) {
        self.touched.insert(address);
    }

    pub fn schedule_selfdestruct(&mut self, address: Address) {
        self.selfdestructs.insert(address);
    }

    /// Snapshot the sets that the call/create revert protocol must roll
    /// back (§4.F). `accessed_addresses`/`accessed_storage_keys` are
    /// deliberately *not* part of the snapshot: EIP-2929 warmth gained
    /// inside a frame that later reverts still survives the revert
    /// (testable property 5, property 9), so there is nothing to restore
    /// there.
    pub fn snapshot(&self) -> SubStateSnapshot {
        SubStateSnapshot {
            selfdestructs: self.selfdestructs.clone(),
            touched: self.touched.clone(),
            refund_counter: self.refund_counter,
        }
    }

    pub fn restore(&mut self, snapshot: SubStateSnapshot) {
        let address_three = Address::from_low_u64_be(3);
        let address_three_touched = self.touched.contains(&address_three);
        self.selfdestructs = snapshot.selfdestructs;
        self.touched = snapshot.touched;
        self.refund_counter = snapshot.refund_counter;
        // EIP-K.1 quirk: 0x03 stays touched across this revert if it was
        // touched at any point during the reverted frame, regardless of
        // whether it was touched before the snapshot was taken.
        if address_three_touched {
            self.touched.insert(address_three);
        }
        // accessed_addresses / accessed_storage_keys survive revert (EIP-2929).
    }
}

#[derive(Debug, Clone)]
pub struct SubStateSnapshot {
    selfdestructs: HashSet<Address>,
    touched: HashSet<Address>,
    refund_counter: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_address_reports_first_touch_only() {
        let mut sub = SubState::new();
        let addr = Address::repeat_byte(0x11);
        assert!(sub.access_address(addr));
        assert!(!sub.access_address(addr));
    }

    #[test]
    fn restore_keeps_warmth_gained_after_the_snapshot_eip_2929() {
        // Access-list warmth gained inside a frame that later reverts
        // still survives the revert (testable property 5/9).
        let mut sub = SubState::new();
        let addr = Address::repeat_byte(0x22);
        let snap = sub.snapshot();
        sub.access_address(addr);
        assert!(sub.accessed_addresses.contains(&addr));
        sub.restore(snap);
        assert!(sub.accessed_addresses.contains(&addr));
    }

    #[test]
    fn restore_undoes_touched_and_selfdestructs_gained_after_the_snapshot() {
        let mut sub = SubState::new();
        let addr = Address::repeat_byte(0x33);
        let snap = sub.snapshot();
        sub.touch(addr);
        sub.schedule_selfdestruct(addr);
        sub.restore(snap);
        assert!(!sub.touched.contains(&addr));
        assert!(!sub.selfdestructs.contains(&addr));
    }

    #[test]
    fn restore_preserves_address_three_touched_quirk() {
        // EIP-K.1: address 0x03 stays touched across a revert if it was
        // touched before the revert, even though revert otherwise undoes
        // touched-ness gained inside the reverted frame.
        let mut sub = SubState::new();
        let address_three = Address::from_low_u64_be(3);
        let snap = sub.snapshot();
        sub.touch(address_three);
        sub.restore(snap);
        assert!(sub.touched.contains(&address_three));
    }
}
