//! Wire codec: chunk decoding, line framing, and message parse/serialize.
//!
//! IRC is line-oriented: CRLF-terminated outbound, newline-split inbound.
//! A line is an optional `:`-prefixed source, a verb, and space-delimited
//! parameters; a parameter starting with `:` swallows the rest of the line
//! (spaces included) and is always the last one.

use std::fmt;

/// Decode one inbound chunk. Strict UTF-8 first; anything that fails is
/// re-read as Latin-1 (one byte per char) so no chunk is ever rejected
/// for encoding reasons.
pub fn decode_chunk(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Accumulates decoded text across reads and yields complete lines.
///
/// A trailing partial line is retained until the rest of it arrives.
/// Empty lines are discarded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk; returns the complete lines it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&decode_chunk(chunk));
        let mut lines = Vec::new();
        while let Some(idx) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=idx).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.trim().is_empty() {
                lines.push(line.to_owned());
            }
        }
        lines
    }
}

/// Errors from parsing a single line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("line has no fields")]
    Empty,
    #[error("source prefix without a verb")]
    MissingVerb,
}

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Source prefix without the leading `:` (server name or `nick!ident@host`).
    pub prefix: Option<String>,
    /// The verb as received (`PRIVMSG`, `001`, ...). Not case-normalized.
    pub verb: String,
    /// Parameters; a trailing parameter has had its `:` sentinel stripped.
    pub params: Vec<String>,
}

impl Message {
    /// Parse one line (line terminators are tolerated and ignored).
    ///
    /// Fields are split on runs of whitespace. Lines with no fields come
    /// back as [`ParseError::Empty`]; callers drop them rather than fail.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start();
        if rest.is_empty() {
            return Err(ParseError::Empty);
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            match stripped.split_once(' ') {
                Some((p, tail)) => {
                    rest = tail.trim_start();
                    Some(p.to_owned())
                }
                None => return Err(ParseError::MissingVerb),
            }
        } else {
            None
        };

        let (verb, mut param_str) = match rest.split_once(' ') {
            Some((v, tail)) => (v, tail.trim_start()),
            None => (rest, ""),
        };
        if verb.is_empty() {
            return Err(ParseError::MissingVerb);
        }

        let mut params = Vec::new();
        while !param_str.is_empty() {
            if let Some(trailing) = param_str.strip_prefix(':') {
                params.push(trailing.to_owned());
                break;
            }
            match param_str.split_once(' ') {
                Some((p, tail)) => {
                    if !p.is_empty() {
                        params.push(p.to_owned());
                    }
                    param_str = tail.trim_start();
                }
                None => {
                    params.push(param_str.to_owned());
                    break;
                }
            }
        }

        Ok(Message {
            prefix,
            verb: verb.to_owned(),
            params,
        })
    }

    /// The sending user's nick, if the prefix is a full `nick!ident@host`.
    /// Server prefixes (no ident/host separators) yield `None`.
    pub fn source_nick(&self) -> Option<&str> {
        let p = self.prefix.as_deref()?;
        if p.contains('!') && p.contains('@') {
            p.split('!').next()
        } else {
            None
        }
    }

    /// The sending user's `(ident, host)` pair, when the prefix carries one.
    pub fn source_ident_host(&self) -> Option<(&str, &str)> {
        let p = self.prefix.as_deref()?;
        let (_, rest) = p.split_once('!')?;
        rest.split_once('@')
    }

    /// Serialize without the trailing CRLF. The last parameter always gets
    /// the `:` sentinel, which is valid for any value and keeps params
    /// containing spaces intact.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        if let Some(ref prefix) = self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(&self.verb);
        if let Some((last, rest)) = self.params.split_last() {
            for p in rest {
                out.push(' ');
                out.push_str(p);
            }
            out.push_str(" :");
            out.push_str(last);
        }
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

// ── Outbound command formatting ──

pub fn nick_line(nick: &str) -> String {
    format!("NICK {nick}")
}

pub fn user_line(user: &str, realname: &str) -> String {
    format!("USER {user} 0 * :{realname}")
}

pub fn pong_line(token: &str) -> String {
    format!("PONG :{token}")
}

pub fn join_line(channel: &str) -> String {
    format!("JOIN {channel}")
}

pub fn part_line(channel: &str) -> String {
    format!("PART {channel}")
}

pub fn privmsg_line(target: &str, text: &str) -> String {
    format!("PRIVMSG {target} :{text}")
}

pub fn quit_line(reason: Option<&str>) -> String {
    match reason {
        Some(r) => format!("QUIT :{r}"),
        None => "QUIT".to_owned(),
    }
}
