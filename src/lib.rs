//! Property graphs stored on a sorted key-value store, with an iterative
//! rank propagation pipeline on top.
//!
//! * [`storage`] maps vertices and edges onto rows and exposes the
//!   [`GraphStore`](storage::GraphStore) adapter.
//! * [`rank`] runs propagation iterations: map, aggregate, import.
//! * [`cli`] holds the pieces the `rowgraph` binary is built from.

#![warn(missing_docs)]

pub mod cli;
pub mod rank;
pub mod storage;
pub mod types;
