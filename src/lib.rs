//! tethercam library crate.
//!
//! Session control, live preview and capture for a tethered camera. The
//! binary drives these against the simulated camera; the modules are
//! public for integration testing and for other front ends.

pub mod camera;
pub mod capture;
pub mod config;
pub mod controller;
pub mod handles;
pub mod preview;
pub mod upload;
