//! # duet-directory
//!
//! The external-collaborator boundary of the duet server: identity lookup,
//! presence tracking, and abuse-report submission all live behind the
//! [`Directory`] trait so the core never talks to an account store directly.
//!
//! Two in-process implementations ship with the crate:
//!
//! - [`MemoryDirectory`] — a fixed roster of profiles, used for seeded
//!   deployments and throughout the test suites
//! - [`OpenDirectory`] — accepts any identity on first sight, for
//!   anonymous/dev deployments

#![deny(unsafe_code)]

pub mod directory;
pub mod memory;

pub use directory::{AbuseReport, Directory, DirectoryError, DirectoryResult, UserProfile};
pub use memory::{MemoryDirectory, OpenDirectory};
