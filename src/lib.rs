pub mod builtin;
pub mod client;
pub mod exec;
pub mod local;
pub mod parse;
pub mod protocol;
pub mod server;
