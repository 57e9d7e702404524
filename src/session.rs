use crate::error::{Error, Result};
use std::fmt;

/// Bearer credentials for the external service. Passed explicitly to every
/// authorized call; an empty session makes those calls fail with
/// [`Error::NotAuthenticated`] before anything is sent.
#[derive(Clone, Default)]
pub struct Session {
    token: Option<String>,
}

impl Session {
    pub fn anonymous() -> Session {
        Session { token: None }
    }

    pub fn from_token<S: Into<String>>(token: S) -> Session {
        let token = token.into();
        if token.trim().is_empty() {
            Session::anonymous()
        } else {
            Session { token: Some(token) }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(Error::NotAuthenticated)
    }

    /// Logs out. Later authorized calls fail until a new session is created.
    pub fn invalidate(&mut self) {
        self.token = None;
    }
}

// Keeps tokens out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_session_is_rejected() {
        match Session::anonymous().token() {
            Err(Error::NotAuthenticated) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(!Session::from_token("  ").is_authenticated());
    }

    #[test]
    fn invalidate_logs_out() {
        let mut session = Session::from_token("secret");
        assert_eq!(session.token().unwrap(), "secret");
        session.invalidate();
        assert!(session.token().is_err());
    }

    #[test]
    fn debug_hides_token() {
        let session = Session::from_token("secret");
        let debug = format!("{:?}", session);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("true"));
    }
}
