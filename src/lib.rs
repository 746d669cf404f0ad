//! A symbolic-and-concrete interpreter for the Ethereum Virtual Machine.
//!
//! Executes EVM bytecode one opcode at a time over a value domain that is
//! either fully concrete or symbolic (see [`expr`]), suspending cooperatively
//! via [`errors::Query`]/[`errors::Choose`] whenever a step needs an
//! external decision — an SMT query, a storage fetch, an `ffi` call — that
//! the interpreter cannot make on its own.

pub mod branch;
pub mod cache;
pub mod call_frame;
pub mod constants;
pub mod contract;
pub mod db;
pub mod environment;
pub mod errors;
pub mod expr;
pub mod finalize;
pub mod gas;
pub mod opcode_handlers;
pub mod opcodes;
pub mod precompiles;
pub mod primitives;
pub mod substate;
pub mod trace;
pub mod vm;

#[cfg(feature = "cheat")]
pub mod cheatcodes;

pub use errors::{Choose, Query, VMError, VMResultT};
pub use vm::{EVMConfig, VMResult, VM};
