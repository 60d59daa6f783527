#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod ipc;
pub mod native;
pub mod persistence;
pub mod player;
pub mod resource;
