//! Authentication module for the client-side session lifecycle.
//!
//! This module provides:
//! - `TokenStore`: persistence of the raw session token (file, keychain, memory)
//! - `IdentityDecoder`: structural decoding of a token into a `UserIdentity`
//! - `SessionController`: the single owner of `SessionState` (login, register, logout)
//! - `guard`: the route guard deciding whether a protected view may render
//!
//! Tokens are never verified client-side. The backend that issues them is the
//! only party responsible for signature integrity.

pub mod backend;
pub mod clock;
pub mod credentials;
pub mod error;
pub mod guard;
pub mod session;
pub mod store;
pub mod token;

pub use backend::AuthBackend;
pub use clock::{Clock, FixedClock, SystemClock};
pub use credentials::KeyringTokenStore;
pub use error::{AuthError, DecodeError, StoreError};
pub use guard::{evaluate, post_login_destination, GuardDecision, ReturnPolicy};
pub use session::{SessionController, SessionState};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::{DecodedToken, IdentityDecoder};
