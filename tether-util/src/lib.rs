//! Helpers shared by the tether crates: on-disk locations, atomic writes,
//! a small JSON document store, URI handling and serde adapters.

pub mod crypto;
pub mod dirs;
pub mod fs;
pub mod http;
pub mod json;
pub mod store;
