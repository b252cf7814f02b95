// SPDX-License-Identifier: GPL-3.0-only

pub mod access;
pub mod cli;
pub mod conversation;
pub mod error;
pub mod input;
pub mod pam;
pub mod supervisor;

pub use error::{Error, ExitOutcome};
pub use supervisor::Supervisor;

/// The operation requested on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Verify the old password only
    AuthOnly,
    /// Verify the old password and replace it
    Change,
}
