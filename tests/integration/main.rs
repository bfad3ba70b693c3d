//! Integration tests for the rewind binary and the downgrade pipeline

mod cli;
mod common;
mod pipeline;
