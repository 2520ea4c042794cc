//! Unit tests for the Vultr backend.
