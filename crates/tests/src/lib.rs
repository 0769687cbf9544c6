//! Cross-crate integration tests for the parametrix engine

#[cfg(test)]
mod chain_integration;
