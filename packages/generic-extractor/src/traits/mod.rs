//! Core trait abstractions for the extractor.
//!
//! These traits are the seams between the recursive job engine and its
//! collaborators: transport, pagination, parsing, expressions,
//! authentication and metadata persistence.

pub mod auth;
pub mod expression;
pub mod metadata;
pub mod parser;
pub mod scroller;
pub mod transport;
