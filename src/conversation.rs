// SPDX-License-Identifier: GPL-3.0-only

//! Answers PAM conversation messages from the credentials read on stdin.
//!
//! PAM decides which prompts are sent and in what order, so every message is
//! checked against what is expected after the number of passwords already
//! given. Anything else stops the conversation instead of risking sending a
//! password in reply to the wrong prompt.

use zeroize::Zeroizing;

use crate::input::Credentials;

/// Sent by `pam_unix` when the password has expired, before asking for a new one
const EXPIRED_ADVISORY: &str = "You are required to change your password immediately";

/// Number of masked prompts answered so far.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct ConversationState(u8);

impl ConversationState {
    pub const OLD_SECRET: Self = Self(0);
    pub const NEW_SECRET: Self = Self(1);
    pub const CONFIRM_SECRET: Self = Self(2);
    pub const FINISHED: Self = Self(3);

    pub fn answered(self) -> u8 {
        self.0
    }

    fn advance(self) -> Self {
        debug_assert!(self < Self::FINISHED);
        Self(self.0 + 1)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageStyle {
    PromptEchoOff,
    PromptEchoOn,
    ErrorMsg,
    TextInfo,
}

impl MessageStyle {
    pub fn describe(self) -> &'static str {
        match self {
            Self::PromptEchoOff => "PAM_PROMPT_ECHO_OFF",
            Self::PromptEchoOn => "PAM_PROMPT_ECHO_ON",
            Self::ErrorMsg => "PAM_ERROR_MSG",
            Self::TextInfo => "PAM_TEXT_INFO",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Message<'m> {
    pub style: MessageStyle,
    pub text: &'m str,
}

impl<'m> Message<'m> {
    pub fn new(style: MessageStyle, text: &'m str) -> Self {
        Self { style, text }
    }
}

/// What to do with a password quality complaint once the new password was sent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectionPolicy {
    Strict,
    Lenient,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Secret {
    Old,
    New,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Answer(Secret),
    Acknowledge,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConversationFault {
    #[error("unexpected protocol message ({}) after {} answers: {text}", .style.describe(), .state.answered())]
    Unexpected {
        state: ConversationState,
        style: MessageStyle,
        text: String,
    },
    #[error("{0}")]
    PolicyRejected(String),
}

/// The reply to one message, empty for messages that only need acknowledging.
#[derive(Debug, Default)]
pub struct Response(Option<Zeroizing<String>>);

impl Response {
    pub fn answer(&self) -> Option<&str> {
        self.0.as_ref().map(|secret| secret.as_str())
    }
}

/// Decide how to handle a single message in `state`.
pub fn step(
    state: ConversationState,
    message: &Message<'_>,
    policy: RejectionPolicy,
) -> Result<(ConversationState, Action), ConversationFault> {
    use MessageStyle::*;

    let action = match (state, message.style) {
        (ConversationState::OLD_SECRET, PromptEchoOff) => Action::Answer(Secret::Old),
        // "Changing password for ..."
        (ConversationState::OLD_SECRET, TextInfo) => Action::Acknowledge,

        (ConversationState::NEW_SECRET, PromptEchoOff) => Action::Answer(Secret::New),
        (ConversationState::NEW_SECRET, TextInfo) => Action::Acknowledge,
        (ConversationState::NEW_SECRET, ErrorMsg) if message.text.starts_with(EXPIRED_ADVISORY) => {
            Action::Acknowledge
        }

        (ConversationState::CONFIRM_SECRET, PromptEchoOff) => Action::Answer(Secret::New),
        (ConversationState::CONFIRM_SECRET, ErrorMsg) => reject(message, policy)?,

        // "Password changed."
        (ConversationState::FINISHED, TextInfo) => Action::Acknowledge,
        (ConversationState::FINISHED, ErrorMsg) => reject(message, policy)?,

        _ => return Err(unexpected(state, message)),
    };

    let next = match action {
        Action::Answer(_) => state.advance(),
        Action::Acknowledge => state,
    };
    Ok((next, action))
}

fn reject(message: &Message<'_>, policy: RejectionPolicy) -> Result<Action, ConversationFault> {
    match policy {
        RejectionPolicy::Strict => Err(ConversationFault::PolicyRejected(message.text.to_string())),
        RejectionPolicy::Lenient => {
            tracing::debug!("ignoring password complaint: {:?}", message.text);
            Ok(Action::Acknowledge)
        }
    }
}

fn unexpected(state: ConversationState, message: &Message<'_>) -> ConversationFault {
    ConversationFault::Unexpected {
        state,
        style: message.style,
        text: message.text.to_string(),
    }
}

/// Answer a whole batch of messages, one response per message in order.
pub fn respond(
    state: ConversationState,
    batch: &[Message<'_>],
    credentials: &Credentials,
    policy: RejectionPolicy,
) -> Result<(ConversationState, Vec<Response>), ConversationFault> {
    let mut state = state;
    let mut responses = Vec::with_capacity(batch.len());
    for message in batch {
        let (next, action) = step(state, message, policy)?;
        let response = match action {
            Action::Acknowledge => Response::default(),
            Action::Answer(Secret::Old) => {
                Response(Some(Zeroizing::new(credentials.old_secret().to_string())))
            }
            Action::Answer(Secret::New) => match credentials.new_secret() {
                Some(secret) => Response(Some(Zeroizing::new(secret.to_string()))),
                // Only authenticating, there is no new password to give
                None => return Err(unexpected(state, message)),
            },
        };
        tracing::debug!(
            "conversation: state={} msg_style={:?} msg={:?} answered={}",
            state.answered(),
            message.style.describe(),
            message.text,
            response.answer().is_some()
        );
        state = next;
        responses.push(response);
    }
    Ok((state, responses))
}

/// Stateful wrapper around [`respond`] for the lifetime of one PAM session.
///
/// The first fault is latched: the adapter refuses every later message with
/// it, and the supervisor reads it back once PAM returns.
pub struct ConversationAdapter<'a> {
    credentials: &'a Credentials,
    policy: RejectionPolicy,
    state: ConversationState,
    fault: Option<ConversationFault>,
}

impl<'a> ConversationAdapter<'a> {
    pub fn new(credentials: &'a Credentials, policy: RejectionPolicy) -> Self {
        Self {
            credentials,
            policy,
            state: ConversationState::default(),
            fault: None,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn fault(&self) -> Option<&ConversationFault> {
        self.fault.as_ref()
    }

    pub fn answer(&mut self, batch: &[Message<'_>]) -> Result<Vec<Response>, ConversationFault> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        match respond(self.state, batch, self.credentials, self.policy) {
            Ok((next, responses)) => {
                if next != self.state {
                    tracing::debug!(
                        "conversation state {} -> {}",
                        self.state.answered(),
                        next.answered()
                    );
                }
                self.state = next;
                Ok(responses)
            }
            Err(fault) => {
                tracing::debug!("conversation failed: {}", fault);
                self.fault = Some(fault.clone());
                Err(fault)
            }
        }
    }
}
