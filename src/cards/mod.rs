pub mod client;

pub use client::{CardApiError, CardBalance, ProviderTransaction, StroWalletClient};
