//! Scenario tests for the saga coordinator.
//!
//! ## Test Organization
//!
//! - `common`: Shared ledger, error type and action factories
//! - `basic`: Successful executions
//! - `compensation`: Rollback order, skipped handlers, failing handlers
//! - `retry`: Retry-wrapped steps inside a saga
//! - `callbacks`: Success and failure callbacks
//! - `cancellation`: Cancellation and deadlines between steps and during backoff
//!
//! ## Test Ledger
//!
//! Every action writes an event to a shared [`common::Ledger`]:
//! `do:<name>` for forward attempts, `undo:<name>` for compensations and
//! `success` / `failure` for the callbacks. Assertions compare event order.

mod common;
