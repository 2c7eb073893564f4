pub mod api;
pub mod controller;
pub mod error;
pub mod guard;
pub mod interpreter;
pub mod logging;
pub mod preview;
pub mod render;
pub mod session;
pub mod stub_server;
pub mod taxonomy;
pub mod transport;
