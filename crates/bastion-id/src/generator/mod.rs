mod lock;
mod node;
#[cfg(test)]
mod tests;

pub use lock::*;
pub use node::*;
