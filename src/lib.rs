//! Pry: owner-takeover exploit runner for Ethereum CTF challenges

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod inspect;
pub mod runner;
