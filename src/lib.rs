//! Consumer group coordination for Kafka clients.
//!
//! This crate implements the client side of the classic consumer group
//! protocol: join, sync, heartbeat and leave, generation fencing, static
//! membership and offset commits. It does not talk to brokers by itself, the
//! request/response mechanics are supplied through a [`connection::CoordinatorLink`]
//! implementation and partition assignment through a [`client::assignor::Assignor`].
//!
//! Start with [`client::ConsumerGroupBuilder`].
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod backoff;

pub mod client;

pub mod connection;

pub mod protocol;

mod throttle;

pub mod topic;

pub use backoff::BackoffConfig;
