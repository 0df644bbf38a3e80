#![doc = include_str!("../README.md")]

mod error;
mod generator;
mod id;
mod status;
mod time;

pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::status::*;
pub use crate::time::*;
