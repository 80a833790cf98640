pub mod compiler;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod runtime;
pub mod storage;
pub mod worker;
