//! Kindling - native library boot layer for multimedia applications
//!
//! Kindling materializes a set of native shared libraries onto disk, verifies
//! their integrity, loads them through the OS dynamic linker and exposes a
//! uniform handle + symbol-resolution abstraction for higher-level bindings
//! (audio, graphics, text) to build on.
//!
//! # Modules
//!
//! - [`boot`]: Boot sequencer state machine driving the whole sequence
//! - [`config`]: Boot configuration (`boot.json`)
//! - [`manifest`]: Resource manifest describing which libraries to load
//! - [`extract`]: Payload staging and integrity verification
//! - [`registry`]: File name → loaded-library registry with symbol resolution
//! - [`platform`]: OS detection and per-OS loader strategies
//! - [`error`]: The loader error taxonomy

pub mod boot;
pub mod config;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod platform;
pub mod registry;
