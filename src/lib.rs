//! Display Relay - an organization-gated relay to a display screen
//!
//! Members of one GitHub organization log in through OAuth and submit short
//! messages, which are padded for the screen and forwarded to its API.

pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod views;

#[cfg(test)]
mod test_utils;
