//! Filesystem helpers: traversal, entry metadata, atomic writes.

pub mod atomic;
pub mod metadata;
pub mod walker;
