pub mod activity;
pub mod banner;
pub mod config;
pub mod consts;
pub mod engine;
pub mod events;
pub mod license;
pub mod platform;
pub mod reaction;
pub mod safety;
