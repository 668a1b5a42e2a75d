pub mod cron_auth;
pub mod webhook_signature;
