pub mod authentication;
pub mod capability;
pub mod errors;
pub mod gate;
pub mod models;
pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod mocks;
