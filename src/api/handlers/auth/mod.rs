//! Identity handlers and supporting modules.
//!
//! The account lifecycle is verify-then-register: an applicant proves
//! control of their mailbox with a one-time code, submits a registration
//! request, and an administrator approves or rejects it. Only approval
//! creates a row in `users`.
//!
//! ## Credentials
//!
//! Login issues two signed tokens: a short-lived access token returned in
//! the response body and a long-lived refresh token set as an `HttpOnly`
//! cookie scoped to the refresh endpoint. Logout revokes the refresh
//! token's id for its remaining lifetime; access tokens keep working until
//! expiry, which bounds the logout blast radius to one access-token TTL.

mod password;
pub(crate) mod principal;
pub(crate) mod registration;
pub(crate) mod requests;
pub(crate) mod reset;
mod role;
pub(crate) mod session;
mod state;
mod storage;
mod tokens;
pub(crate) mod types;
mod utils;

pub use role::{authorize, Role};
pub use state::{AuthConfig, AuthState};
pub use types::ApprovalStatus;
