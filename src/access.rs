// SPDX-License-Identifier: GPL-3.0-only

use nipasswd_config::OperationPolicy;
use std::io;

use crate::error::{DenialReason, SystemError};

/// An account that exists in the system user database.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserRecord {
    pub uid: u32,
    pub gid: u32,
    pub name: String,
}

impl From<nix::unistd::User> for UserRecord {
    fn from(user: nix::unistd::User) -> Self {
        Self {
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            name: user.name,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupRecord {
    pub gid: u32,
    pub members: Vec<String>,
}

impl From<nix::unistd::Group> for GroupRecord {
    fn from(group: nix::unistd::Group) -> Self {
        Self {
            gid: group.gid.as_raw(),
            members: group.mem,
        }
    }
}

/// Account database lookups. `Ok(None)` means the name does not exist, `Err`
/// means the lookup itself failed.
pub trait AccountDirectory {
    fn user(&self, name: &str) -> io::Result<Option<UserRecord>>;

    fn group(&self, name: &str) -> io::Result<Option<GroupRecord>>;
}

/// The passwd and group databases through NSS.
pub struct SystemDirectory;

impl AccountDirectory for SystemDirectory {
    fn user(&self, name: &str) -> io::Result<Option<UserRecord>> {
        // getpwnam_r, so an NSS failure stays an error instead of looking like a missing user
        nix::unistd::User::from_name(name)
            .map(|user| user.map(UserRecord::from))
            .map_err(io::Error::from)
    }

    fn group(&self, name: &str) -> io::Result<Option<GroupRecord>> {
        nix::unistd::Group::from_name(name)
            .map(|group| group.map(GroupRecord::from))
            .map_err(io::Error::from)
    }
}

/// Group names an account must belong to, in the order they are checked.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GroupAcl {
    groups: Vec<String>,
}

impl GroupAcl {
    /// Parse a colon separated list, skipping empty entries.
    pub fn parse(list: &str) -> Self {
        Self {
            groups: list
                .split(':')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// `Ok(true)` if `user` may proceed. Groups that do not exist are skipped;
    /// when none of them exist the list places no restriction.
    pub fn permits<D: AccountDirectory>(
        &self,
        directory: &D,
        user: &UserRecord,
    ) -> Result<bool, SystemError> {
        let mut group_exists = false;
        for name in &self.groups {
            let group = directory
                .group(name)
                .map_err(|source| SystemError::GroupLookup {
                    name: name.clone(),
                    source,
                })?;
            let Some(group) = group else {
                tracing::debug!("group {:?} does not exist, skipping", name);
                continue;
            };
            group_exists = true;

            if group.gid == user.gid {
                tracing::debug!("{} has primary group {}", user.name, name);
                return Ok(true);
            }
            if group.members.iter().any(|member| *member == user.name) {
                tracing::debug!("{} is a member of {}", user.name, name);
                return Ok(true);
            }
        }
        Ok(!group_exists)
    }
}

/// Decides whether an account may be handled at all, before PAM is started.
pub struct AccessGate<'d, D> {
    directory: &'d D,
    min_uid: Option<u32>,
    max_uid: Option<u32>,
    acl: GroupAcl,
}

impl<'d, D: AccountDirectory> AccessGate<'d, D> {
    pub fn new(directory: &'d D, policy: &OperationPolicy) -> Self {
        Self {
            directory,
            min_uid: policy.min_uid,
            max_uid: policy.max_uid,
            acl: GroupAcl::parse(&policy.groups),
        }
    }

    /// Resolve `username`, `Ok(Err(_))` when the account must be refused.
    pub fn check(&self, username: &str) -> Result<Result<UserRecord, DenialReason>, SystemError> {
        let user = self
            .directory
            .user(username)
            .map_err(|source| SystemError::UserLookup {
                name: username.to_string(),
                source,
            })?;
        let Some(user) = user else {
            return Ok(Err(DenialReason::UnknownUser));
        };

        if let Some(min) = self.min_uid {
            if user.uid < min {
                return Ok(Err(DenialReason::UidBelowMinimum { uid: user.uid, min }));
            }
        }
        if let Some(max) = self.max_uid {
            if user.uid > max {
                return Ok(Err(DenialReason::UidAboveMaximum { uid: user.uid, max }));
            }
        }
        if !self.acl.permits(self.directory, &user)? {
            return Ok(Err(DenialReason::NotInGroup));
        }

        Ok(Ok(user))
    }
}
