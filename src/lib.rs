pub mod api;
pub mod config;
pub mod error;
pub mod feishu;
pub mod models;
pub mod repository;
pub mod schedule;
pub mod services;
pub mod state;
pub mod storage;
