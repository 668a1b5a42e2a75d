pub mod jobs;
pub mod tracking;
pub mod webhooks;
