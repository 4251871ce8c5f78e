pub mod checkpoint;
pub mod memory;
pub mod repository;
