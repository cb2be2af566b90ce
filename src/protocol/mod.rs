//! Typed group coordinator requests and responses.
//!
//! These mirror the fields of the Kafka group and offset APIs. Encoding them
//! on the wire is left to the [`CoordinatorLink`](crate::connection::CoordinatorLink)
//! implementation.

pub mod error;
pub mod messages;
