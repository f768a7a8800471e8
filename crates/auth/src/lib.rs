//! `stockledger-auth`: pure actor identity and authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: tokens are decoded
//! elsewhere, and only their claims are checked here.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod roles;

pub use authorize::{authorize, AuthzError};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use permissions::Permission;
pub use roles::Role;
