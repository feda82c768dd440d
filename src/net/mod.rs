//! Network side of the agent: request/response snapshots and the fetch primitive.

mod client;
#[cfg(test)]
pub mod stub;
mod types;

pub use client::{HttpClient, Network};
pub use types::{Request, Response};
