//! chat-service: a single `POST /chat` endpoint that continues a prompt with a
//! locally loaded language model.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
