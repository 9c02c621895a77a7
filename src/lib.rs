pub mod args;
pub mod backend;
pub mod errors;
pub mod report;
pub mod server;
pub mod store;
pub mod suppress;
pub mod tools;
