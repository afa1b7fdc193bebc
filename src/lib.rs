//! Purpose: Library crate backing the `tfsview` CLI: TFS model, reader/writer and queries.
//! Exports: `api` (stable surface), `core` (model, reader, writer, errors), `query`,
//! `profile`, `chart`, `notice`.
//! Role: Everything the CLI does is reachable from here without touching stdout/stderr.
//! Invariants: Library code never prints; diagnostics go through `tracing` or `Notice` values.
//! Invariants: Query, profile and chart operations are pure over an immutable `Document`.
pub mod api;
pub mod chart;
pub mod core;
pub mod notice;
pub mod profile;
pub mod query;
