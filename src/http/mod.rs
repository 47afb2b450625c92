//! HTTP admission layer and server.

mod middleware;
mod server;

pub use middleware::{admission, extract_identity, AdmissionState, IDENTITY_HEADER, UNKNOWN_IDENTITY};
pub use server::{router, HttpServer, RESOURCE_PATH};
