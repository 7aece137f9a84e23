//! # Request Handlers
//!
//! HTTP handlers bridging the API layer and the services. Each handler:
//!
//! 1. **Gates** - applies the route's authorization gate on the extracted
//!    [`shared::auth::Principal`]
//! 2. **Parses** - query pairs and the `{"data": …}` envelope
//! 3. **Delegates** - to the service layer
//! 4. **Shapes** - the response envelope and status code
//!
//! All handlers return `Result<HttpResponse, ApiError>`; the error type
//! renders the `{"message": …}` envelope with the right status code.

pub mod apikeys;
pub mod auth;
pub mod collections;
pub mod records;
pub mod system;
pub mod users;
