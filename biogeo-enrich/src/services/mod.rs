//! External-service clients and coordinate validation
//!
//! Every external call site goes through `rate_limiter::RateLimitedClient`,
//! one instance per rate-limit domain, so spacing and retry policy are
//! defined once.

pub mod elevation;
pub mod geocoder;
pub mod overpass;
pub mod rate_limiter;
pub mod validator;

pub use elevation::ElevationClient;
pub use geocoder::NominatimClient;
pub use overpass::OverpassClient;
pub use rate_limiter::RateLimitedClient;
