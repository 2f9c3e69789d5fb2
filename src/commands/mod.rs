mod channel;
mod config_cmd;
mod draw;
mod watch;

pub use channel::ChannelCommand;
pub use config_cmd::ConfigCommand;
pub use draw::DrawCommand;
pub use watch::WatchCommand;
