pub mod ports;
pub mod protocol;
pub mod retrieval;
pub mod session;
