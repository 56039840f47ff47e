//! Pieces shared by the engagement services: the error taxonomy and response
//! envelopes, JWT auth extractors, tracing and metrics setup, and the
//! Postgres, Redis and RabbitMQ clients.

pub mod clients;
pub mod errors;
pub mod middleware;
pub mod types;
