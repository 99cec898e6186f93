// src/supervisor/command.rs

//! Shell-word command templates for the build and server commands.
//!
//! Templates are split once, at configuration time, so a malformed command
//! is rejected before anything runs. The server template may contain
//! whole-word placeholders:
//!
//! - `{}` is replaced by `host:port`
//! - `{host}` is replaced by the host
//! - `{port}` is replaced by the port

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::types::UpstreamAddr;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("command parser error: unbalanced quotes or trailing escape in {0:?}")]
    Unparsable(String),

    #[error("command is empty")]
    Empty,
}

/// A command split into program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let args = shlex::split(raw).ok_or_else(|| TemplateError::Unparsable(raw.to_string()))?;
        if args.is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(Self {
            raw: raw.to_string(),
            args,
        })
    }

    /// Parse an optional command; blank input means "no command".
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, TemplateError> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Self::parse(raw).map(Some)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Substitute address placeholders, returning `[program, args...]`.
    pub fn render(&self, addr: &UpstreamAddr) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                "{}" => addr.to_string(),
                "{host}" => addr.host().to_string(),
                "{port}" => addr.port().to_string(),
                _ => arg.clone(),
            })
            .collect()
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for CommandTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
