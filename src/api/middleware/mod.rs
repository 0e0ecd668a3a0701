pub mod auth;

pub use auth::{ApiKeySessionResolver, Identity, IdentityResolution, SessionResolver};
