// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Which accounts an operation may be performed on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationPolicy {
    /// Accounts below this uid are refused. `None` disables the check.
    pub min_uid: Option<u32>,
    /// Accounts above this uid are refused. `None` disables the check.
    pub max_uid: Option<u32>,
    /// Colon separated group names, the account must belong to one of them.
    /// If none of the groups resolve, the check is disabled.
    pub groups: String,
    /// Run the backend account check after authenticating.
    pub account_check: bool,
}

impl Default for OperationPolicy {
    fn default() -> Self {
        Self {
            min_uid: None,
            max_uid: None,
            groups: String::from(":"),
            account_check: true,
        }
    }
}

impl OperationPolicy {
    pub(crate) fn from_build_env(
        min_uid: Option<&'static str>,
        max_uid: Option<&'static str>,
        groups: Option<&'static str>,
    ) -> Self {
        Self {
            min_uid: min_uid.and_then(parse_uid),
            max_uid: max_uid.and_then(parse_uid),
            groups: groups.unwrap_or(":").to_string(),
            ..Self::default()
        }
    }
}

// Negative values follow the historical `-1` convention for "disabled"
fn parse_uid(value: &str) -> Option<u32> {
    value.trim().parse::<i64>().ok().and_then(|uid| u32::try_from(uid).ok())
}
