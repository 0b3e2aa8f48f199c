//! API client for the posting endpoint

pub mod client;
pub mod posts;

pub use client::AuthenticatedClient;
pub use posts::{publish, PostData};
