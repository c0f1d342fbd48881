pub mod api;
mod client;
mod convert;
mod helpers;

pub use client::BackendClient;
