//! capstore - a single-file, size-bounded, concurrent-safe record store
//!
//! The store owns one backing file with a hard byte cap fixed at creation.
//! Producers call `put`, a consumer drains records through an iterator and
//! reclaims their space with `remove_read_records`, and the file never grows
//! past the cap: space freed by consumed records is reused in place.

pub mod config;
pub mod observability;
pub mod store;
