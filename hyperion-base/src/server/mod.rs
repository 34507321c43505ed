pub use base_server::*;
pub use response::*;

mod base_server;
mod response;
