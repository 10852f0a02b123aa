//! Offline-aware sync engine for HackNotify.
//!
//! Screen loads go to the hosted backend first and fall back to a per-user
//! local cache. A service worker answers shell requests from a versioned
//! response cache, and a one-shot precache run after sign-in warms it.

pub mod backend;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod online;
pub mod precache;
pub mod query;
pub mod screens;
pub mod views;
pub mod worker;

#[cfg(test)]
mod testing;
