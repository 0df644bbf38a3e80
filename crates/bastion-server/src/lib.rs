#![doc = include_str!("../README.md")]

pub mod server;

pub use bastion_id;
pub use bastion_store;
pub use server::config::{ConfigProvider, EnvConfigProvider, RuntimeConfig, StaticConfigProvider};
pub use server::error::{Error, Result};
pub use server::protocol::{RouteFactory, Services};
pub use server::runtime::{AppHandle, Phase, Runtime};
pub use server::view::ViewConfig;
