// SPDX-License-Identifier: GPL-3.0-only

use clap_lex::RawArgs;
use std::{ffi::OsString, path::Path};

use crate::{Mode, error::Error};

/// Command line flags. Nothing else is accepted, everything that matters is
/// read from standard input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Args {
    pub debug: bool,
    pub mode: Mode,
    pub strict: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            debug: false,
            mode: Mode::Change,
            strict: false,
        }
    }
}

impl Args {
    pub fn parse<I, T>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let raw = RawArgs::new(args);
        let mut cursor = raw.cursor();
        let program = raw
            .next_os(&mut cursor)
            .and_then(|arg0| Path::new(arg0).file_name())
            .map_or_else(
                || "nipasswd".to_string(),
                |name| name.to_string_lossy().into_owned(),
            );
        let usage = || Error::Usage(program.clone());

        let mut parsed = Self::default();
        while let Some(arg) = raw.next(&mut cursor) {
            if arg.is_escape() {
                // No positional arguments are taken, not even after `--`
                if raw.peek(&cursor).is_some() {
                    return Err(usage());
                }
                break;
            } else if let Some((long, value)) = arg.to_long() {
                if value.is_some() {
                    return Err(usage());
                }
                match long {
                    Ok("debug") => parsed.debug = true,
                    Ok("auth-only") => parsed.mode = Mode::AuthOnly,
                    Ok("strict") => parsed.strict = true,
                    _ => return Err(usage()),
                }
            } else if let Some(shorts) = arg.to_short() {
                for short in shorts {
                    match short {
                        Ok('D') => parsed.debug = true,
                        Ok('a') => parsed.mode = Mode::AuthOnly,
                        Ok('s') => parsed.strict = true,
                        _ => return Err(usage()),
                    }
                }
            } else {
                return Err(usage());
            }
        }

        Ok(parsed)
    }
}
