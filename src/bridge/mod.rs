pub mod consumers;
pub mod decoder;
pub mod reconciler;
pub mod types;
