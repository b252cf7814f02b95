// SPDX-License-Identifier: GPL-3.0-only

use std::{io, process::ExitCode};

use crate::{conversation::ConversationFault, input::InputError, pam::BackendStatus};

/// How the process terminates, chosen once per invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitOutcome {
    /// Password successfully verified or changed
    Success,
    /// Failed due to an error
    Error,
    /// Failed due to username/password authentication
    Denied,
    /// Failed due to password quality checks
    BadSecret,
}

impl ExitOutcome {
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::Denied => 2,
            Self::BadSecret => 3,
        }
    }
}

impl From<ExitOutcome> for ExitCode {
    fn from(outcome: ExitOutcome) -> Self {
        ExitCode::from(outcome.code())
    }
}

/// Why access was refused. Only used for tracing, the user facing text is the
/// same for every reason the gate refuses an account.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DenialReason {
    UnknownUser,
    UidBelowMinimum { uid: u32, min: u32 },
    UidAboveMaximum { uid: u32, max: u32 },
    NotInGroup,
    Backend(BackendStatus),
    /// The account can only be unlocked by an administrator
    Expired,
    /// The password has expired and may only be changed, not used
    MustChange,
}

impl DenialReason {
    fn message(&self) -> &'static str {
        match self {
            Self::Expired => "credential expired, must be reset by an administrator",
            Self::MustChange => "credential expired, must be changed",
            _ => "Access denied.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Cannot set user id: {0}")]
    Privilege(#[source] io::Error),
    #[error("Error initializing PAM subsystem: {}", .0.describe())]
    SessionOpen(BackendStatus),
    #[error("FATAL ERROR resolving user \"{name}\": {source}")]
    UserLookup {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("FATAL ERROR resolving group \"{name}\": {source}")]
    GroupLookup {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("PAM error authenticating user: {}", .0.describe())]
    Authenticate(BackendStatus),
    #[error("PAM error checking account: {}", .0.describe())]
    AccountCheck(BackendStatus),
    #[error("Error setting new password: {}", .0.describe())]
    SetCredential(BackendStatus),
    #[error("System Error - Unexpected PAM message ({style}): {text}")]
    UnexpectedMessage { style: &'static str, text: String },
    #[error("Error loading configuration: {0}")]
    Config(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("usage: {0} [-Das]")]
    Usage(String),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error("{}", .0.message())]
    AccessDenied(DenialReason),
    #[error("{0}")]
    PolicyRejected(String),
}

impl Error {
    pub fn outcome(&self) -> ExitOutcome {
        match self {
            Self::Usage(_) | Self::Input(_) | Self::System(_) => ExitOutcome::Error,
            Self::AccessDenied(_) => ExitOutcome::Denied,
            Self::PolicyRejected(_) => ExitOutcome::BadSecret,
        }
    }
}

impl From<ConversationFault> for Error {
    fn from(fault: ConversationFault) -> Self {
        match fault {
            ConversationFault::Unexpected { style, text, .. } => {
                SystemError::UnexpectedMessage {
                    style: style.describe(),
                    text,
                }
                .into()
            }
            ConversationFault::PolicyRejected(text) => Self::PolicyRejected(text),
        }
    }
}
