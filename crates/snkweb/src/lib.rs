//! # snkweb
//!
//! Client for a remote log search service.
//!
//! - [`Session`]: login/logout over REST and the bearer token they yield.
//! - [`ResourceClient`]: CRUD on stored resources.
//! - [`SearchChannel`]: the search WebSocket, one request in flight at a
//!   time, plus the submit → poll → fetch → close lifecycle.
//! - [`decode_entries`]: fetched entries to [`ResultRecord`]s.
//! - [`Client`]: all of the above behind one object.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod resources;
pub mod search;
pub mod session;

pub use client::Client;
pub use errors::{ClientError, Result};
pub use resources::{ResourceClient, ResourceDescriptor};
pub use search::{
    ResultRecord, SearchChannel, SearchHandle, SearchStats, decode_entries,
};
pub use session::Session;
pub use snkweb_settings::{LoginCredentials, SnkSettings};
