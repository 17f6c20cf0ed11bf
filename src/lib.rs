pub mod cli;
pub mod clients;
pub mod config;
pub mod models;
pub mod session;
pub mod stomp;
pub mod sync;
pub mod validation;
pub mod ws;
