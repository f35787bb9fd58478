//! Miniblog - A small multi-user blog backend
//!
//! Articles with tags, likes and comments, plus the listing engine that
//! filters, sorts and paginates them.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
