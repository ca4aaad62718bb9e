//! Authentication and authorization
//!
//! - `session`: opaque session tokens, cookie state, login and registration
//! - `guard`: request -> [`AuthorizationContext`] or a 401/403-class error
//! - `password`: argon2id hashing shared with the admin CLI
//! - `validate`: precondition checks used right after the guard

pub mod errors;
pub mod guard;
pub mod password;
pub mod session;
pub mod types;
pub mod validate;

pub use errors::AuthError;
pub use guard::{Guard, extract_token};
pub use password::CredentialHasher;
pub use session::{IssuedSession, Registration, Session, SessionIssuer};
pub use types::{AuthorizationContext, DataScope, Role};
pub use validate::{ValidationError, assert_positive_int, assert_status, parse_positive_int};
