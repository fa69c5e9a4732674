//! Process identity exchanged during election and used as the log label.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// `<app>:<pid>` label of one master candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    app: String,
    pid: u32,
}

/// Error returned when a peer's identity line cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed identity {0:?}")]
pub struct IdentityParseError(pub String);

impl Identity {
    pub fn new(app: impl Into<String>, pid: u32) -> Self {
        Self {
            app: app.into(),
            pid,
        }
    }

    /// Identity of the running process.
    pub fn current(app: impl Into<String>) -> Self {
        Self::new(app, std::process::id())
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.app, self.pid)
    }
}

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || IdentityParseError(s.to_string());
        let (app, pid) = s.rsplit_once(':').ok_or_else(malformed)?;
        if app.is_empty() || app.chars().any(char::is_control) {
            return Err(malformed());
        }
        let pid: u32 = pid.parse().map_err(|_| malformed())?;
        if pid == 0 {
            return Err(malformed());
        }
        Ok(Self::new(app, pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let id = Identity::new("monarch", 4242);
        assert_eq!(id.to_string(), "monarch:4242");
        assert_eq!("monarch:4242".parse::<Identity>().unwrap(), id);
    }

    #[test]
    fn app_may_contain_colons() {
        let id: Identity = "svc:blue:17".parse().unwrap();
        assert_eq!(id.app(), "svc:blue");
        assert_eq!(id.pid(), 17);
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "monarch", ":12", "monarch:", "monarch:0", "monarch:-3", "HTTP/1.1 200 OK"] {
            assert!(input.parse::<Identity>().is_err(), "{input:?} parsed");
        }
    }
}
