// relayq-client/src/lib.rs

pub mod client;

pub use client::RelayqClient;
