// SPDX-License-Identifier: GPL-3.0-only

use pam_client::{ConversationHandler, ErrorCode, Flag};
use std::{
    ffi::{CStr, CString},
    io,
};
use zeroize::Zeroize;

use crate::{
    access::UserRecord,
    conversation::{ConversationAdapter, ConversationFault, Message, MessageStyle},
};

/// Result of a call into the authentication backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BackendStatus {
    Success,
    UserUnknown,
    AuthError,
    /// The password has expired and must be changed
    NewCredentialRequired,
    AccountExpired,
    /// The password has been expired for too long to be changed by the user
    CredentialExpired,
    PermissionDenied,
    ConversationError,
    CredentialError,
    Other(String),
}

impl BackendStatus {
    pub fn describe(&self) -> String {
        match self {
            Self::Success => "Success".to_string(),
            Self::UserUnknown => "User not known to the underlying authentication module".to_string(),
            Self::AuthError => "Authentication failure".to_string(),
            Self::NewCredentialRequired => {
                "Authentication token is no longer valid; new one required".to_string()
            }
            Self::AccountExpired => "User account has expired".to_string(),
            Self::CredentialExpired => "Authentication token expired".to_string(),
            Self::PermissionDenied => "Permission denied".to_string(),
            Self::ConversationError => "Conversation error".to_string(),
            Self::CredentialError => "Authentication token manipulation error".to_string(),
            Self::Other(message) => message.clone(),
        }
    }
}

impl From<&pam_client::Error> for BackendStatus {
    fn from(err: &pam_client::Error) -> Self {
        match err.code() {
            ErrorCode::USER_UNKNOWN => Self::UserUnknown,
            ErrorCode::AUTH_ERR => Self::AuthError,
            ErrorCode::NEW_AUTHTOK_REQD => Self::NewCredentialRequired,
            ErrorCode::ACCT_EXPIRED => Self::AccountExpired,
            ErrorCode::AUTHTOK_EXPIRED => Self::CredentialExpired,
            ErrorCode::PERM_DENIED => Self::PermissionDenied,
            ErrorCode::CONV_ERR => Self::ConversationError,
            ErrorCode::AUTHTOK_ERR => Self::CredentialError,
            _ => Self::Other(err.to_string()),
        }
    }
}

/// Opens sessions with the authentication backend.
pub trait Backend {
    type Session<'a>: Session;

    /// Make the process identity match the account about to be handled.
    fn align_privilege(&mut self, user: &UserRecord) -> io::Result<()>;

    fn open<'a>(
        &mut self,
        user: &UserRecord,
        adapter: ConversationAdapter<'a>,
    ) -> Result<Self::Session<'a>, BackendStatus>;
}

/// One backend transaction. The backend talks to the conversation adapter it
/// was opened with while these calls run.
pub trait Session {
    fn authenticate(&mut self) -> Result<(), BackendStatus>;

    fn account_check(&mut self) -> Result<(), BackendStatus>;

    fn set_credential(&mut self) -> Result<(), BackendStatus>;

    /// The fault the conversation adapter stopped on, if any.
    fn fault(&self) -> Option<ConversationFault>;

    /// Close the session. Closing again is a no-op.
    fn end(&mut self);
}

pub struct PamBackend {
    service: String,
}

impl PamBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl Backend for PamBackend {
    type Session<'a> = PamSession<'a>;

    //IMPORTANT: the real uid must be the account being changed. With pam_ldap on Debian,
    // a real uid of root makes the module prompt for the LDAP admin password instead.
    fn align_privilege(&mut self, user: &UserRecord) -> io::Result<()> {
        if unsafe { libc::setreuid(user.uid, 0) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn open<'a>(
        &mut self,
        user: &UserRecord,
        adapter: ConversationAdapter<'a>,
    ) -> Result<PamSession<'a>, BackendStatus> {
        let context = pam_client::Context::new(&self.service, Some(&user.name), adapter)
            .map_err(|err| BackendStatus::from(&err))?;
        tracing::debug!("started PAM service {:?} for {:?}", self.service, user.name);
        Ok(PamSession {
            context: Some(context),
            last_status: BackendStatus::Success,
        })
    }
}

pub struct PamSession<'a> {
    context: Option<pam_client::Context<ConversationAdapter<'a>>>,
    last_status: BackendStatus,
}

impl<'a> PamSession<'a> {
    fn call(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut pam_client::Context<ConversationAdapter<'a>>) -> Result<(), pam_client::Error>,
    ) -> Result<(), BackendStatus> {
        let Some(context) = self.context.as_mut() else {
            return Err(BackendStatus::Other(format!("{name} called after session end")));
        };
        let status = match f(context) {
            Ok(()) => BackendStatus::Success,
            Err(err) => BackendStatus::from(&err),
        };
        tracing::debug!("{}: {}", name, status.describe());
        self.last_status = status.clone();
        match status {
            BackendStatus::Success => Ok(()),
            status => Err(status),
        }
    }
}

impl Session for PamSession<'_> {
    fn authenticate(&mut self) -> Result<(), BackendStatus> {
        self.call("pam_authenticate", |context| context.authenticate(Flag::NONE))
    }

    fn account_check(&mut self) -> Result<(), BackendStatus> {
        self.call("pam_acct_mgmt", |context| context.acct_mgmt(Flag::NONE))
    }

    fn set_credential(&mut self) -> Result<(), BackendStatus> {
        self.call("pam_chauthtok", |context| context.chauthtok(Flag::NONE))
    }

    fn fault(&self) -> Option<ConversationFault> {
        self.context
            .as_ref()
            .and_then(|context| context.conversation().fault().cloned())
    }

    fn end(&mut self) {
        // Dropping the context calls pam_end with the last status PAM returned
        if let Some(context) = self.context.take() {
            tracing::debug!(
                "terminating with PAM status: {}",
                self.last_status.describe()
            );
            drop(context);
        }
    }
}

impl Drop for PamSession<'_> {
    fn drop(&mut self) {
        self.end();
    }
}

/// Copy an answer into the `CString` pam-client wants back. The buffer has room
/// for the terminator, so the conversion never reallocates and leaves no
/// unwiped copy behind. pam-client `strdup`s the result and drops it.
fn secret_c_string(answer: &str) -> Result<CString, ErrorCode> {
    let mut bytes = Vec::with_capacity(answer.len() + 1);
    bytes.extend_from_slice(answer.as_bytes());
    CString::new(bytes).map_err(|err| {
        tracing::error!("failed to convert answer to C string: {}", err.nul_position());
        err.into_vec().zeroize();
        ErrorCode::CONV_ERR
    })
}

impl ConversationAdapter<'_> {
    fn prompt(&mut self, style: MessageStyle, prompt_c: &CStr) -> Result<CString, ErrorCode> {
        let prompt = prompt_c.to_string_lossy();
        let responses = self
            .answer(&[Message::new(style, &prompt)])
            .map_err(|_| ErrorCode::CONV_ERR)?;
        let answer = responses
            .first()
            .and_then(|response| response.answer())
            .ok_or(ErrorCode::CONV_ERR)?;
        secret_c_string(answer)
    }

    fn notice(&mut self, style: MessageStyle, msg_c: &CStr) {
        let msg = msg_c.to_string_lossy();
        // A fault is latched in the adapter and picked up by the supervisor
        let _ = self.answer(&[Message::new(style, &msg)]);
    }
}

impl ConversationHandler for ConversationAdapter<'_> {
    fn prompt_echo_on(&mut self, prompt_c: &CStr) -> Result<CString, ErrorCode> {
        self.prompt(MessageStyle::PromptEchoOn, prompt_c)
    }

    fn prompt_echo_off(&mut self, prompt_c: &CStr) -> Result<CString, ErrorCode> {
        self.prompt(MessageStyle::PromptEchoOff, prompt_c)
    }

    fn text_info(&mut self, msg: &CStr) {
        self.notice(MessageStyle::TextInfo, msg);
    }

    fn error_msg(&mut self, msg: &CStr) {
        self.notice(MessageStyle::ErrorMsg, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mode, conversation::RejectionPolicy, input::InputReader};
    use std::io::Cursor;

    #[test]
    fn describe_is_owned_and_stable() {
        assert_eq!(BackendStatus::AuthError.describe(), "Authentication failure");
        assert_eq!(
            BackendStatus::Other("Module is unknown".to_string()).describe(),
            "Module is unknown"
        );
    }

    #[test]
    fn secret_conversion_reuses_its_buffer() {
        let answer = secret_c_string("n3w-secret").unwrap();
        assert_eq!(answer.as_bytes(), b"n3w-secret");

        let bytes = answer.into_bytes_with_nul();
        assert_eq!(bytes.len(), "n3w-secret".len() + 1);
        assert_eq!(bytes.capacity(), bytes.len());

        assert_eq!(secret_c_string("a\0b"), Err(ErrorCode::CONV_ERR));
    }

    #[test]
    fn handler_answers_and_latches() {
        let credentials = InputReader::new(64)
            .read(Cursor::new(&b"alice\noldpw\n"[..]), Mode::AuthOnly)
            .unwrap();
        let mut adapter = ConversationAdapter::new(&credentials, RejectionPolicy::Strict);

        adapter.text_info(c"Changing password for alice.");
        let answer = adapter.prompt_echo_off(c"Password: ").unwrap();
        assert_eq!(answer.as_bytes(), b"oldpw");

        adapter.text_info(c"unexpected");
        assert!(adapter.fault().is_none());

        assert!(adapter.prompt_echo_on(c"login: ").is_err());
        assert!(adapter.fault().is_some());
        assert!(adapter.prompt_echo_off(c"New password: ").is_err());
    }
}
