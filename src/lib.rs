//! video-sync - Synchronized video playback over a LAN
//!
//! One master and any number of slaves share a broadcast command protocol:
//! - The master loads and pre-rolls media, then repeatedly schedules a
//!   common start instant, plays, heartbeats, and resets for the next loop
//! - Slaves validate origin and session epoch on every message and apply
//!   commands strictly in order on a single worker
//! - A slave watchdog reverts to a standby display when the master goes quiet
//! - Epoch fencing drops commands from superseded master incarnations

pub mod channel;
pub mod clock;
pub mod config;
pub mod master;
pub mod media;
pub mod protocol;
pub mod slave;
#[cfg(test)]
pub mod testutil;
