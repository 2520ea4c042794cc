//! Unit tests for remote operations, split by operation kind.

mod transfer;
