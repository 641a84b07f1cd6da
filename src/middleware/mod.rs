mod auth;
mod error_handler;
mod rate_limit;
mod signature;

pub use auth::{auth_middleware, moderator_only};
pub use error_handler::log_errors;
pub use rate_limit::{RateLimiter, client_ip, rate_limit};
pub use signature::{
    SIGNATURE_HEADER, SignatureVerifier, TIMESTAMP_HEADER, canonical_payload, verify_signature,
};
