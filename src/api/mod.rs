//! S3 API implementation: auth, error envelope, XML rendering, request
//! dispatch.

pub mod auth;
mod errors;
mod extractors;
pub mod handlers;
mod router;
mod xml;

pub use errors::S3Error;
pub use extractors::{AuthenticatedOwner, BucketName, ObjectPath};
pub use router::build_router;
