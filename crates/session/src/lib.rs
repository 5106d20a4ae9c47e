//! Client-side authentication state
//!
//! Holds the in-memory access token and the authenticated identity, and runs
//! the session lifecycle (login, register, logout, silent restore on startup).
//! Transport is abstracted behind `AuthBackend`; the request gateway crate
//! provides the HTTP implementation, including the shared refresh protocol.
//!
//! Session flow:
//! 1. Host calls `Session::initialize_once()` at startup → silent refresh via
//!    the out-of-band refresh cookie, identity loaded from `/auth/me`
//! 2. Anonymous users call `Session::login()` → token + identity installed
//! 3. Gateway refreshes the token on 401 and writes it back via `AuthState`
//! 4. `Session::logout()` or an unrecoverable refresh failure → state cleared

pub mod backend;
pub mod constants;
pub mod error;
pub mod guard;
pub mod identity;
pub mod lifecycle;
pub mod state;

pub use backend::AuthBackend;
pub use constants::*;
pub use error::{AuthFailure, Error, Result};
pub use guard::{NavigationDecision, RouteAccess, login_location};
pub use identity::{AuthGrant, Credentials, Identity, Registration};
pub use lifecycle::{Session, SessionPhase};
pub use state::{AuthState, SessionSnapshot};
