//! Purpose: Tyco document engine with a C ABI for non-Rust hosts.
//! Exports: `abi` (C entry points), `api` (owned Rust wrappers), `core` (engine), `golden`.
//! Role: Library behind `libtyco` (cdylib/staticlib), the `tyco` CLI and the conformance runner.
//! Invariants: Rust callers use `api`; C callers use `abi`; both share one engine.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod abi;
pub mod api;
pub mod core;
pub mod golden;
