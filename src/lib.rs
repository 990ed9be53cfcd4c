// src/lib.rs

//! Marketplace Crawler Library

pub mod browser;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
