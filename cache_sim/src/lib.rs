//! Simulation of a set-associative cache, optionally backed by a second
//! level, over a stream of word-address references.

pub mod addr;
pub mod cache;
pub mod geometry;
pub mod reference;
pub mod sim;
pub mod trace;

#[cfg(feature = "stat")]
pub mod stat;
