#![doc = include_str!("../README.md")]

mod actor;
mod audit;
mod config;
mod error;
mod hooks;
mod schema;
mod session;
mod statement;
mod store;
mod value;


pub use crate::actor::*;
pub use crate::audit::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::hooks::*;
pub use crate::schema::*;
pub use crate::session::*;
pub use crate::statement::*;
pub use crate::store::*;
pub use crate::value::*;
// Downstream crates reach the ID generator and sqlx row types through here.
pub use bastion_id;
pub use sqlx::any::AnyRow;
