//! Service operations.
//!
//! Each operation validates its input, runs the primary mutation plus
//! its reaction pipeline inside one transaction, and pushes the
//! accumulated live events after the commit.

pub mod catalog;
pub mod collaboration;
pub mod notifications;
pub mod participation;
pub mod tasks;
