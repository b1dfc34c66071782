pub mod recv;
pub mod rtt;
pub mod send;
pub mod server;
pub mod tcb;
pub mod timer;

pub use server::{TcpApplication, TcpServer};
pub use tcb::Connection;
