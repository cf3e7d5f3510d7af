//! Upstream API clients

pub mod battlenet;

pub use battlenet::BattleNetClient;
