mod client;

pub use client::{CallOutcome, UpstreamClient};
