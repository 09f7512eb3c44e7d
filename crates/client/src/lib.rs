//! Client side of Herald.
//!
//! [`Publisher`] reads an archive's index, batches the hashes and streams them
//! to the service through a [`PublishApi`]; [`PublishClient`] is the HTTP
//! implementation of that API.

pub mod api_client;
pub mod error;
pub mod publisher;

pub use api_client::{PublishApi, PublishClient};
pub use error::{PublishError, Rejection, Result};
pub use publisher::{PublishReport, Publisher};
