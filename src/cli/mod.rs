//! Command implementations for the apigraph binary

pub mod load;
