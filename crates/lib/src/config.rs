//! Typed runtime policies.
//!
//! The binary maps its CLI flags and environment variables onto [`Config`];
//! the library only ever sees these validated values.

use std::time::Duration;

use tower_cookies::cookie::SameSite;

use crate::{Error, Result};

/// Default session cookie name.
pub const SESSION_COOKIE: &str = "tally_session";

/// Default session lifetime: seven days.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest session lifetime accepted: one year.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default keep-alive interval for the live feed.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(25);

/// How sessions are minted and carried in cookies.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub cookie_name: String,
    pub ttl: Duration,
    /// Emit the `Secure` attribute. Only disable for plain-HTTP local development.
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            cookie_name: SESSION_COOKIE.to_string(),
            ttl: DEFAULT_SESSION_TTL,
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

impl SessionPolicy {
    /// Session lifetime in milliseconds. Saturates; [`Config::validate`] caps the TTL well below that.
    pub fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Argon2id work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl PasswordPolicy {
    /// Cheapest parameters argon2 accepts. Test use only.
    pub fn minimal() -> Self {
        Self {
            memory_kib: argon2::Params::MIN_M_COST.max(8),
            iterations: 1,
            parallelism: 1,
        }
    }

    pub(crate) fn params(&self) -> Result<argon2::Params> {
        argon2::Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(
            |e| Error::Config {
                reason: format!("invalid argon2 parameters: {e}"),
            },
        )
    }
}

/// Live feed behaviour.
#[derive(Debug, Clone, Copy)]
pub struct FeedPolicy {
    pub heartbeat: Duration,
}

impl Default for FeedPolicy {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

/// All runtime policies.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub session: SessionPolicy,
    pub password: PasswordPolicy,
    pub feed: FeedPolicy,
}

impl Config {
    /// Reject values that would make the server unusable.
    pub fn validate(&self) -> Result<()> {
        if self.session.ttl.is_zero() {
            return Err(Error::Config {
                reason: "session TTL must be positive".to_string(),
            });
        }
        if self.session.ttl > MAX_SESSION_TTL {
            return Err(Error::Config {
                reason: format!(
                    "session TTL must not exceed {} hours",
                    MAX_SESSION_TTL.as_secs() / 3600
                ),
            });
        }
        if self.session.cookie_name.is_empty() {
            return Err(Error::Config {
                reason: "session cookie name must not be empty".to_string(),
            });
        }
        if self.feed.heartbeat.is_zero() {
            return Err(Error::Config {
                reason: "feed heartbeat must be positive".to_string(),
            });
        }
        self.password.params()?;
        Ok(())
    }
}
