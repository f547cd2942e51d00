//! Command implementations for the `lifecycle` binary.

pub mod init;
pub mod run;
