pub mod client;
pub mod evm;
pub mod scanner;
pub mod tron;
pub mod types;
pub mod window;
