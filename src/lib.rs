//! doormon - a latching trigger monitor.
//!
//! A single boolean latch is set by edges on a trigger input, survives
//! restarts through a durable store, and is exposed over HTTP for status
//! queries and resets.

pub mod config;
pub mod daemon;
pub mod edge;
pub mod flusher;
pub mod indicator;
pub mod latch;
pub mod monitor;
pub mod persistence;
pub mod server;
pub mod supervisor;

#[cfg(test)]
mod test_utils;
