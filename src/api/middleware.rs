//! HTTP middleware

use actix_cors::Cors;

/// Any origin, method and header, with credentials.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}
