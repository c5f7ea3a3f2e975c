//! Tracks which website is active, for how long, and whether that time was productive.
//! A native host turns activation events into timed sessions, keeps them in a bounded local
//! ledger and forwards them to an activity service whenever a credential is available.
//!

pub mod cli;
pub mod remote;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod tracker;
pub mod utils;
