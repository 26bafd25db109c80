//! Client-side session and conversation state for the Asha career assistant.

pub mod api;
pub mod app;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod identity;
pub mod models;
pub mod overlay;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod voice;

#[cfg(test)]
mod test_support;
