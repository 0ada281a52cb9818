pub mod bilibili;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod maimai;
pub mod queue;
pub mod util; // doctestのためpubにする

pub use command::{Command, CommandKind};
pub use config::{AppConfig, ConfigError};
pub use dispatch::Dispatcher;
