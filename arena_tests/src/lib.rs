//! Integration test crate for the arena workspace. See `tests/`.
