// SPDX-License-Identifier: GPL-3.0-only

pub mod policy;

use color_eyre::eyre::{self, WrapErr};
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};

pub use policy::OperationPolicy;

pub const CONFIG_PATH: &str = match option_env!("NIPASSWD_CONFIG_PATH") {
    Some(path) => path,
    None => "/etc/nipasswd/config.ron",
};

/// PAM service name, decides which policy is used (see `/etc/pam.d`)
pub const DEFAULT_SERVICE: &str = "nipasswd";
pub const DEFAULT_FAIL_DELAY_SECS: u64 = 5;
/// Longest accepted input line, including its newline
pub const DEFAULT_MAX_LINE_LEN: usize = 65535;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub service: String,
    pub fail_delay_secs: u64,
    pub max_line_len: usize,
    /// Treat a password quality complaint from PAM as fatal, same as `--strict`
    pub strict: bool,
    /// Verify the old password with `pam_authenticate` before `pam_chauthtok`.
    /// Disable for stacks whose password module asks for the current password itself.
    pub authenticate_before_change: bool,
    pub auth: OperationPolicy,
    pub change: OperationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            fail_delay_secs: DEFAULT_FAIL_DELAY_SECS,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            strict: false,
            authenticate_before_change: true,
            auth: OperationPolicy::from_build_env(
                option_env!("NIPASSWD_AUTH_MIN_UID"),
                option_env!("NIPASSWD_AUTH_MAX_UID"),
                option_env!("NIPASSWD_AUTH_GROUP_REQ"),
            ),
            change: OperationPolicy::from_build_env(
                option_env!("NIPASSWD_CHANGE_MIN_UID"),
                option_env!("NIPASSWD_CHANGE_MAX_UID"),
                option_env!("NIPASSWD_CHANGE_GROUP_REQ"),
            ),
        }
    }
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    /// A missing file means the built in defaults. Anything else that goes wrong
    /// is an error, a broken file must not quietly lift restrictions.
    pub fn load_from(path: &Path) -> eyre::Result<Self> {
        match fs::read_to_string(path) {
            Ok(ron) => Self::from_ron(&ron)
                .wrap_err_with(|| format!("failed to parse configuration {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no configuration at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(err) => Err(err)
                .wrap_err_with(|| format!("failed to read configuration {}", path.display())),
        }
    }

    pub fn from_ron(ron: &str) -> eyre::Result<Self> {
        let config = ron::from_str::<Self>(ron)?;
        if config.max_line_len < 2 {
            eyre::bail!("max_line_len must leave room for at least one byte and a newline");
        }
        Ok(config)
    }
}
