//! End-of-transaction finalization (§4.I).
//!
//! Once the top-level frame halts, the driver still owes three things
//! before the `VMResult` is final: cap and apply the accumulated gas
//! refund, credit the coinbase its fee, and sweep any EIP-161 "touched
//! but empty" accounts (plus anything scheduled by `SELFDESTRUCT`) out of
//! the working set. The working-set type itself (`crate::vm::Account`)
//! lives in `vm.rs`, so the sweep helpers here take a predicate rather
//! than importing it, keeping this module usable from a plain
//! `HashMap<Address, AccountInfo>` too (as the unit tests below do).

use crate::primitives::{Address, U256};
use std::collections::HashSet;

/// `min(gasUsed / 5, refundCounter)` — EIP-3529's post-London refund cap
/// (§4.I, §6). Pre-London's `/2` cap is not modeled; this crate targets
/// the schedule named in §6.
pub fn capped_refund(gas_used: u64, refund_counter: u64) -> u64 {
    (gas_used / 5).min(refund_counter)
}

/// Gas actually charged to the sender once the refund is applied.
pub fn net_gas_used(gas_used: u64, refund_counter: u64) -> u64 {
    gas_used.saturating_sub(capped_refund(gas_used, refund_counter))
}

/// Coinbase fee credit: `gasUsed(after refund) * effective_gas_price`
/// (the EIP-1559 tip, or the full gas price pre-1559; this crate always
/// receives the already-resolved effective price from the embedding).
pub fn coinbase_credit(net_gas_used: u64, effective_gas_price: U256) -> U256 {
    U256::from(net_gas_used).saturating_mul(effective_gas_price)
}

/// EIP-161 sweep: of the `touched` addresses, return those for which
/// `is_empty` holds (zero balance, zero nonce, empty code). Accounts that
/// were merely read, never touched, are untouched by this pass.
pub fn empty_touched_accounts(
    touched: &HashSet<Address>,
    is_empty: impl Fn(&Address) -> bool,
) -> Vec<Address> {
    touched.iter().filter(|addr| is_empty(addr)).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default, Clone, Copy)]
    struct Info {
        balance: U256,
        nonce: u64,
        code_len: usize,
    }

    #[test]
    fn refund_is_capped_at_one_fifth_of_gas_used() {
        assert_eq!(capped_refund(100, 1_000), 20);
        assert_eq!(capped_refund(100, 5), 5);
    }

    #[test]
    fn sweep_selects_only_touched_and_empty_accounts() {
        let mut accounts: HashMap<Address, Info> = HashMap::new();
        let empty_addr = Address::repeat_byte(1);
        let nonempty_addr = Address::repeat_byte(2);
        accounts.insert(empty_addr, Info::default());
        accounts.insert(
            nonempty_addr,
            Info {
                balance: U256::from(1),
                nonce: 0,
                code_len: 0,
            },
        );
        let mut touched = HashSet::new();
        touched.insert(empty_addr);
        touched.insert(nonempty_addr);

        let swept = empty_touched_accounts(&touched, |addr| {
            accounts
                .get(addr)
                .map(|info| info.balance.is_zero() && info.nonce == 0 && info.code_len == 0)
                .unwrap_or(false)
        });
        assert_eq!(swept, vec![empty_addr]);
    }

    #[test]
    fn coinbase_credit_multiplies_net_gas_by_tip() {
        assert_eq!(coinbase_credit(100, U256::from(2)), U256::from(200));
    }
}
