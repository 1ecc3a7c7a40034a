//! Library entrypoint for gpgsign.
//!
//! The primary interface is the `gpgsign` binary. This lib target exposes the
//! GnuPG session client and the signing workflow to integration tests.

pub mod config;
pub mod files;
pub mod gnupg;
pub mod output;
pub mod workflow;
