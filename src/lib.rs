pub mod client;
pub mod clock;
pub mod config;
pub mod content;
pub mod extract;
pub mod history;
pub mod logging;
pub mod messages;
pub mod native;
pub mod native_channel;
pub mod protocol;
pub mod replay;
pub mod server;
pub mod state;
