//! Resource cache
//!
//! Provides content-addressed caching of fetched resources keyed by a
//! hash of the resource's type, version, source and params.
//!
//! # Cache States
//!
//! | State | Description |
//! |-------|-------------|
//! | Miss | No volume exists for the key on this worker |
//! | Building | Volume exists, Create has not finished; reused on retry |
//! | Complete | Initialized, immutable, returned to every caller |

pub mod identity;
pub mod metadata;
pub mod volume;

pub use identity::{cache_key, canonical_json, lock_name, CacheScope};
pub use metadata::MetadataStore;
pub use volume::{slot_state, CacheState, VolumeCache};
