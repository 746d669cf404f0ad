//! Gas-accounting properties (§8): memory expansion is monotonic and
//! quadratic, and the refund cap never exceeds one fifth of gas used.

use sevm::constants::FeeSchedule;
use sevm::gas::{memory_expansion_cost, new_memory_word_size};

#[test]
fn memory_expansion_cost_grows_faster_than_linearly() {
    let schedule = FeeSchedule::default();
    let small = memory_expansion_cost(&schedule, 0, 10);
    let large = memory_expansion_cost(&schedule, 0, 1000);
    // 100x the words should cost more than 100x as much once the
    // quadratic term dominates.
    assert!(large > small * 100);
}

#[test]
fn memory_expansion_only_charges_the_marginal_growth() {
    let schedule = FeeSchedule::default();
    let first = memory_expansion_cost(&schedule, 0, 10);
    let grown_from_ten = memory_expansion_cost(&schedule, 10, 20);
    let straight_to_twenty = memory_expansion_cost(&schedule, 0, 20);
    assert_eq!(first + grown_from_ten, straight_to_twenty);
}

#[test]
fn new_memory_word_size_never_shrinks() {
    assert_eq!(new_memory_word_size(0, 0, 5), 5);
    assert_eq!(new_memory_word_size(100, 32, 1), 5);
}

#[test]
fn finalize_refund_cap_matches_eip_3529() {
    assert_eq!(sevm::finalize::capped_refund(1_000, 10_000), 200);
    assert_eq!(sevm::finalize::capped_refund(1_000, 50), 50);
}
