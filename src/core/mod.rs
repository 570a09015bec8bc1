//! Core business logic for the account lifecycle service

pub mod auth;
pub mod config;
pub mod db;
pub mod mail;
