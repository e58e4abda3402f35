pub mod capture_source;
pub mod memory_delegate;
pub mod persistence_writer;
