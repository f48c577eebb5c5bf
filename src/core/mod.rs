//! Core session lifecycle: authentication, token storage and configuration

pub mod auth;
pub mod config;
pub mod db;

#[cfg(test)]
mod test_support;
