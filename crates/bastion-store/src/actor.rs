use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Identifier of the user on whose behalf a request runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl ActorId {
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl FromStr for ActorId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request-scoped attribution passed into every persistence hook.
///
/// An absent actor is valid: audit user columns are then written as `NULL`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActorContext {
    pub actor: Option<ActorId>,
}

impl ActorContext {
    pub const fn anonymous() -> Self {
        Self { actor: None }
    }

    pub const fn new(actor: ActorId) -> Self {
        Self { actor: Some(actor) }
    }

    /// Resolves an actor from a raw header or metadata value. Missing or
    /// malformed values resolve to an anonymous context.
    pub fn from_header(value: Option<&str>) -> Self {
        Self {
            actor: value.and_then(|v| v.parse().ok()),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.actor.map(|a| a.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_values_resolve_or_fall_back_to_anonymous() {
        assert_eq!(ActorContext::from_header(Some(" 42 ")).user_id(), Some(42));
        assert_eq!(ActorContext::from_header(Some("abc")), ActorContext::anonymous());
        assert_eq!(ActorContext::from_header(None).user_id(), None);
    }
}
