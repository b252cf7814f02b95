// SPDX-License-Identifier: GPL-3.0-only

use nipasswd_config::{Config, OperationPolicy};
use std::{io::BufRead, thread, time::Duration};

use crate::{
    Mode,
    access::{AccessGate, AccountDirectory},
    conversation::{ConversationAdapter, RejectionPolicy},
    error::{DenialReason, Error, SystemError},
    input::InputReader,
    pam::{Backend, BackendStatus, Session},
};

/// Runs one password operation from start to finish.
pub struct Supervisor<'c> {
    config: &'c Config,
    mode: Mode,
    rejection: RejectionPolicy,
}

impl<'c> Supervisor<'c> {
    pub fn new(config: &'c Config, mode: Mode, strict: bool) -> Self {
        let rejection = if strict || config.strict {
            RejectionPolicy::Strict
        } else {
            RejectionPolicy::Lenient
        };
        Self {
            config,
            mode,
            rejection,
        }
    }

    fn policy(&self) -> &'c OperationPolicy {
        match self.mode {
            Mode::AuthOnly => &self.config.auth,
            Mode::Change => &self.config.change,
        }
    }

    /// Read the credentials from `input` and perform the operation. The backend
    /// session is closed and the credentials wiped before this returns.
    pub fn run<R, D, B>(&self, input: R, directory: &D, backend: &mut B) -> Result<(), Error>
    where
        R: BufRead,
        D: AccountDirectory,
        B: Backend,
    {
        let result = self.process(input, directory, backend);
        if let Err(Error::AccessDenied(_)) = result {
            thread::sleep(Duration::from_secs(self.config.fail_delay_secs));
        }
        result
    }

    fn process<R, D, B>(&self, input: R, directory: &D, backend: &mut B) -> Result<(), Error>
    where
        R: BufRead,
        D: AccountDirectory,
        B: Backend,
    {
        let credentials = InputReader::new(self.config.max_line_len).read(input, self.mode)?;

        let user = match AccessGate::new(directory, self.policy()).check(credentials.username())? {
            Ok(user) => user,
            Err(reason) => {
                tracing::info!("refusing {:?}: {:?}", credentials.username(), reason);
                return Err(Error::AccessDenied(reason));
            }
        };

        backend
            .align_privilege(&user)
            .map_err(SystemError::Privilege)?;

        let adapter = ConversationAdapter::new(&credentials, self.rejection);
        let mut session = backend.open(&user, adapter).map_err(SystemError::SessionOpen)?;
        let result = self.drive(&mut session);
        session.end();

        match &result {
            Ok(()) => tracing::info!("{:?} succeeded for {}", self.mode, user.name),
            Err(err) => tracing::info!("{:?} failed for {}: {}", self.mode, user.name, err),
        }
        result
    }

    fn drive<S: Session>(&self, session: &mut S) -> Result<(), Error> {
        if self.mode == Mode::AuthOnly || self.config.authenticate_before_change {
            let status = session.authenticate();
            match settle(session, status)? {
                Ok(()) => {}
                Err(status @ (BackendStatus::UserUnknown | BackendStatus::AuthError)) => {
                    return Err(Error::AccessDenied(DenialReason::Backend(status)));
                }
                Err(status) => return Err(SystemError::Authenticate(status).into()),
            }
        }

        if self.policy().account_check {
            let status = session.account_check();
            match settle(session, status)? {
                Ok(()) => {}
                Err(BackendStatus::NewCredentialRequired) if self.mode == Mode::Change => {
                    tracing::debug!("password expired, continuing with the change");
                }
                Err(BackendStatus::NewCredentialRequired) => {
                    return Err(Error::AccessDenied(DenialReason::MustChange));
                }
                Err(BackendStatus::AccountExpired | BackendStatus::CredentialExpired) => {
                    return Err(Error::AccessDenied(DenialReason::Expired));
                }
                Err(
                    status @ (BackendStatus::UserUnknown
                    | BackendStatus::AuthError
                    | BackendStatus::PermissionDenied),
                ) => {
                    return Err(Error::AccessDenied(DenialReason::Backend(status)));
                }
                Err(status) => return Err(SystemError::AccountCheck(status).into()),
            }
        }

        if self.mode == Mode::Change {
            let status = session.set_credential();
            settle(session, status)?.map_err(SystemError::SetCredential)?;
        }

        Ok(())
    }
}

/// A fault in the conversation explains the backend failure better than the
/// backend status itself, which is usually just a conversation error.
fn settle<S: Session>(
    session: &S,
    status: Result<(), BackendStatus>,
) -> Result<Result<(), BackendStatus>, Error> {
    match session.fault() {
        Some(fault) => Err(fault.into()),
        None => Ok(status),
    }
}
