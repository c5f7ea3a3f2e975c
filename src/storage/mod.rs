//!  Local state is organized through [state_store::FileStateStore].
//!  The basic idea is:
//!   - There is a directory with one JSON document per [state_store::StateKey].
//!   - Reads take a shared lock, writes and read-modify-write cycles an exclusive one.
//!   - A missing or unreadable document is the same as an absent value.

pub mod state_store;
