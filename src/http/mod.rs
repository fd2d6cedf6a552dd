//! Read-only query API over the mode token, setup documents and count
//! history.

mod handlers;
mod server;

#[cfg(test)]
mod tests;

pub use server::{router, ApiServer, ApiState};
