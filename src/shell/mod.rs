//! Shell process management.
//!
//! One-shot execution only ([`process::Executor::run`]): spawn `sh -c` in its
//! own process group, capture bounded output, kill the whole group on timeout.

pub mod process;
