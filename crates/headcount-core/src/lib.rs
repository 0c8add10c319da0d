pub mod bot;
pub mod config;
pub mod fingerprint;
pub mod identity;
