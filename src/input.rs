// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    io::{self, BufRead, Read},
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Mode;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("premature end of input")]
    PrematureEnd,
    #[error("error reading input: {0}")]
    Read(#[source] io::Error),
    #[error("input rejected: buffer overflow")]
    Overflow,
    #[error("input rejected: invalid encoding")]
    Encoding,
    #[error("input rejected: embedded NUL byte")]
    Nul,
    #[error("Excess input.")]
    Excess,
}

/// The username and passwords read from standard input.
///
/// Only [`InputReader`] creates these. Every field is wiped when the value is
/// dropped, whichever way the invocation ends.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    old_secret: String,
    new_secret: Option<String>,
}

impl Credentials {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn old_secret(&self) -> &str {
        &self.old_secret
    }

    pub fn new_secret(&self) -> Option<&str> {
        self.new_secret.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("old_secret", &"<redacted>")
            .field("new_secret", &self.new_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub struct InputReader {
    max_line_len: usize,
}

impl InputReader {
    pub fn new(max_line_len: usize) -> Self {
        Self { max_line_len }
    }

    /// Read two lines, or three when changing the password, and make sure
    /// nothing follows them.
    pub fn read<R: BufRead>(&self, mut reader: R, mode: Mode) -> Result<Credentials, InputError> {
        let username = self.read_line(&mut reader)?;
        let mut credentials = Credentials {
            username,
            old_secret: String::new(),
            new_secret: None,
        };
        credentials.old_secret = self.read_line(&mut reader)?;
        if mode == Mode::Change {
            credentials.new_secret = Some(self.read_line(&mut reader)?);
        }

        let mut probe = [0u8; 1];
        loop {
            match reader.read(&mut probe) {
                Ok(0) => break,
                Ok(_) => {
                    probe.zeroize();
                    return Err(InputError::Excess);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(InputError::Read(err)),
            }
        }

        Ok(credentials)
    }

    fn read_line<R: BufRead>(&self, reader: &mut R) -> Result<String, InputError> {
        // Sized up front so the line is never reallocated, leaving copies behind
        let mut buf = zeroize::Zeroizing::new(Vec::with_capacity(self.max_line_len));
        let n = reader
            .by_ref()
            .take(self.max_line_len as u64)
            .read_until(b'\n', &mut buf)
            .map_err(InputError::Read)?;

        if n == 0 {
            return Err(InputError::PrematureEnd);
        }
        if buf.last() != Some(&b'\n') {
            return Err(if n >= self.max_line_len {
                InputError::Overflow
            } else {
                InputError::PrematureEnd
            });
        }
        buf.pop();

        if buf.contains(&0) {
            return Err(InputError::Nul);
        }
        match String::from_utf8(std::mem::take(&mut *buf)) {
            Ok(line) => Ok(line),
            Err(err) => {
                err.into_bytes().zeroize();
                Err(InputError::Encoding)
            }
        }
    }
}
