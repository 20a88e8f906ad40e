pub mod jsonrpc;
pub mod tool;
