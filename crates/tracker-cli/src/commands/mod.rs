//! Command handlers

pub mod account;
pub mod confidence;
pub mod config;
pub mod data;
pub mod status;
pub mod sync;
