pub mod ai_provider;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod recognizer;
pub mod scanner;
