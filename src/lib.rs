// src/lib.rs

//! Injury Report Library

pub mod api;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
