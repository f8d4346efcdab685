//! Client and command-line storefront for an AI-agent marketplace.

pub mod api;
pub mod config;
pub mod error;
pub mod nav;
pub mod output;
pub mod review;
pub mod shutdown;
pub mod state;
pub mod store;
pub mod workflow;
