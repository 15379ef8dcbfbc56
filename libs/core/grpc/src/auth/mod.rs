//! Bearer-token verification building blocks.
//!
//! [`KeyResolver`] maps a token header to the key that must have signed it,
//! [`Claims`] is the capability the verified payload must offer, and
//! [`AuthConfig`] carries the validation policy.

mod claims;
mod config;
mod jwks;
mod keys;

pub use claims::{Audience, Claims, RegisteredClaims};
pub use config::{AuthConfig, MissingTokenPolicy};
pub use jwks::{JwksResolver, KeySetError};
pub use keys::{KeyError, KeyResolver, StaticKeys, VerificationKey};
