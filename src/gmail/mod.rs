pub mod client;
pub mod token;
pub mod wire;
