pub mod commands;
pub mod config;
pub mod console;
pub mod microphone;
pub mod user_id;
