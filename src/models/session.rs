//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Browser session carried in the signed session cookie.
///
/// The server keeps no copy; whatever the cookie says (once its signature
/// checks out) is the whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Set once the organization check has passed
    #[serde(default)]
    pub authenticated: bool,
    /// End of the login window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Page to return to after logging in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
}

impl Session {
    /// Drop all prior state and open a login window of `expiry` from `now`.
    ///
    /// Returns the end of the window, or `None` (leaving the session
    /// cleared) when it falls outside the representable time range.
    pub fn authenticate(&mut self, now: DateTime<Utc>, expiry: Duration) -> Option<DateTime<Utc>> {
        self.clear();
        let until = now.checked_add_signed(expiry)?;
        self.authenticated = true;
        self.valid_until = Some(until);
        Some(until)
    }

    /// Whether the session grants access at `now`.
    ///
    /// Both the flag and the window must hold: an expired session with the
    /// flag still set is logged out.
    pub fn is_logged_in(&self, now: DateTime<Utc>) -> bool {
        self.authenticated && self.valid_until.is_some_and(|until| now < until)
    }

    /// Drop all session state
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
