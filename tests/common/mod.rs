// SPDX-License-Identifier: GPL-3.0-only

#![allow(dead_code)]

use nipasswd::{
    access::{AccountDirectory, GroupRecord, UserRecord},
    conversation::{ConversationAdapter, ConversationFault, Message, MessageStyle},
    pam::{Backend, BackendStatus, Session},
};
use nipasswd_config::Config;
use std::{cell::RefCell, collections::HashMap, io, rc::Rc};

/// Config with no denial delay so tests stay fast.
pub fn config() -> Config {
    Config {
        fail_delay_secs: 0,
        ..Config::default()
    }
}

#[derive(Default)]
pub struct Directory {
    users: HashMap<String, UserRecord>,
    groups: HashMap<String, GroupRecord>,
}

impl Directory {
    pub fn with_user(mut self, name: &str, uid: u32, gid: u32) -> Self {
        self.users.insert(
            name.to_string(),
            UserRecord {
                uid,
                gid,
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_group(mut self, name: &str, gid: u32, members: &[&str]) -> Self {
        self.groups.insert(
            name.to_string(),
            GroupRecord {
                gid,
                members: members.iter().map(|member| member.to_string()).collect(),
            },
        );
        self
    }
}

impl AccountDirectory for Directory {
    fn user(&self, name: &str) -> io::Result<Option<UserRecord>> {
        Ok(self.users.get(name).cloned())
    }

    fn group(&self, name: &str) -> io::Result<Option<GroupRecord>> {
        Ok(self.groups.get(name).cloned())
    }
}

/// Messages the backend sends during one call, and the status it returns.
#[derive(Clone, Debug)]
pub struct Step {
    pub batches: Vec<Vec<(MessageStyle, &'static str)>>,
    pub status: BackendStatus,
}

impl Step {
    pub fn ok(batches: Vec<Vec<(MessageStyle, &'static str)>>) -> Self {
        Self {
            batches,
            status: BackendStatus::Success,
        }
    }

    pub fn fail(status: BackendStatus) -> Self {
        Self {
            batches: Vec::new(),
            status,
        }
    }
}

pub fn echo_off(text: &'static str) -> (MessageStyle, &'static str) {
    (MessageStyle::PromptEchoOff, text)
}

pub fn info(text: &'static str) -> (MessageStyle, &'static str) {
    (MessageStyle::TextInfo, text)
}

pub fn error(text: &'static str) -> (MessageStyle, &'static str) {
    (MessageStyle::ErrorMsg, text)
}

#[derive(Clone, Debug)]
pub struct Script {
    pub open: Result<(), BackendStatus>,
    pub privilege: bool,
    pub authenticate: Step,
    pub account_check: Step,
    pub set_credential: Step,
}

impl Script {
    /// A backend that accepts alice's old password and her new one, prompting
    /// in the usual order.
    pub fn canonical() -> Self {
        Self {
            open: Ok(()),
            privilege: true,
            authenticate: Step::ok(vec![vec![echo_off("Password: ")]]),
            account_check: Step::ok(Vec::new()),
            set_credential: Step::ok(vec![
                vec![echo_off("New password: ")],
                vec![echo_off("Retype new password: ")],
                vec![info("passwd: password updated successfully")],
            ]),
        }
    }
}

#[derive(Debug, Default)]
pub struct Log {
    pub aligned_uid: Option<u32>,
    pub opened: u32,
    pub closed: u32,
    pub end_calls: u32,
    pub calls: Vec<&'static str>,
    pub answers: Vec<Option<String>>,
    pub status_at_close: Option<BackendStatus>,
}

pub struct ScriptedBackend {
    pub script: Script,
    pub log: Rc<RefCell<Log>>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            log: Rc::default(),
        }
    }

    pub fn log(&self) -> std::cell::Ref<'_, Log> {
        self.log.borrow()
    }
}

impl Backend for ScriptedBackend {
    type Session<'a> = ScriptedSession<'a>;

    fn align_privilege(&mut self, user: &UserRecord) -> io::Result<()> {
        if !self.script.privilege {
            return Err(io::Error::from_raw_os_error(libc::EPERM));
        }
        self.log.borrow_mut().aligned_uid = Some(user.uid);
        Ok(())
    }

    fn open<'a>(
        &mut self,
        _user: &UserRecord,
        adapter: ConversationAdapter<'a>,
    ) -> Result<ScriptedSession<'a>, BackendStatus> {
        self.script.open.clone()?;
        self.log.borrow_mut().opened += 1;
        Ok(ScriptedSession {
            adapter,
            script: self.script.clone(),
            log: self.log.clone(),
            last_status: BackendStatus::Success,
            closed: false,
        })
    }
}

pub struct ScriptedSession<'a> {
    adapter: ConversationAdapter<'a>,
    script: Script,
    log: Rc<RefCell<Log>>,
    last_status: BackendStatus,
    closed: bool,
}

impl ScriptedSession<'_> {
    fn play(&mut self, name: &'static str, step: Step) -> Result<(), BackendStatus> {
        self.log.borrow_mut().calls.push(name);
        for batch in step.batches {
            let messages: Vec<Message<'_>> = batch
                .iter()
                .map(|(style, text)| Message::new(*style, text))
                .collect();
            match self.adapter.answer(&messages) {
                Ok(responses) => self.log.borrow_mut().answers.extend(
                    responses
                        .iter()
                        .map(|response| response.answer().map(str::to_string)),
                ),
                Err(_) => {
                    self.last_status = BackendStatus::ConversationError;
                    return Err(BackendStatus::ConversationError);
                }
            }
        }
        self.last_status = step.status.clone();
        match step.status {
            BackendStatus::Success => Ok(()),
            status => Err(status),
        }
    }
}

impl Session for ScriptedSession<'_> {
    fn authenticate(&mut self) -> Result<(), BackendStatus> {
        let step = self.script.authenticate.clone();
        self.play("authenticate", step)
    }

    fn account_check(&mut self) -> Result<(), BackendStatus> {
        let step = self.script.account_check.clone();
        self.play("account_check", step)
    }

    fn set_credential(&mut self) -> Result<(), BackendStatus> {
        let step = self.script.set_credential.clone();
        self.play("set_credential", step)
    }

    fn fault(&self) -> Option<ConversationFault> {
        self.adapter.fault().cloned()
    }

    fn end(&mut self) {
        let mut log = self.log.borrow_mut();
        log.end_calls += 1;
        if !self.closed {
            self.closed = true;
            log.closed += 1;
            log.status_at_close = Some(self.last_status.clone());
        }
    }
}

impl Drop for ScriptedSession<'_> {
    fn drop(&mut self) {
        self.end();
    }
}
