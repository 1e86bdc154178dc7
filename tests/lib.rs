// Test module declarations
pub mod common;

#[cfg(test)]
mod integration;
