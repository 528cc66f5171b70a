//! Identity service (spec.md §4.2): org registration, login, token
//! refresh/revoke, and HMAC/bearer validation. `repository` is the
//! credential store; `service` is the operation layer the HTTP routes and
//! the request authenticator middleware both call into.

pub mod repository;
pub mod service;
