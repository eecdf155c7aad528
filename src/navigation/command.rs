use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::layout::{Layout, LayoutComponent};

/// Navigation request emitted by a screen or overlay scope.
///
/// Serialized with a `type` tag (`push`, `setStackRoot`, `pop`,
/// `popToRoot`). Any other tag becomes [`Command::Unknown`] carrying the
/// whole request, which the reducer logs and ignores.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Push { layout: Layout },
    SetStackRoot { layout: Layout },
    Pop,
    PopToRoot,
    Unknown(Value),
}

const KNOWN_KINDS: [&str; 4] = ["push", "setStackRoot", "pop", "popToRoot"];

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Tagged {
    Push { layout: Layout },
    SetStackRoot { layout: Layout },
    Pop,
    PopToRoot,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum TaggedRef<'a> {
    Push { layout: &'a Layout },
    SetStackRoot { layout: &'a Layout },
    Pop,
    PopToRoot,
}

impl Command {
    pub fn push(component: LayoutComponent) -> Self {
        Command::Push {
            layout: Layout::component(component),
        }
    }

    pub fn set_stack_root(layout: Layout) -> Self {
        Command::SetStackRoot { layout }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::Push { .. } => "push",
            Command::SetStackRoot { .. } => "setStackRoot",
            Command::Pop => "pop",
            Command::PopToRoot => "popToRoot",
            Command::Unknown(_) => "unknown",
        }
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let known = match value.get("type").and_then(Value::as_str) {
            Some(kind) => KNOWN_KINDS.contains(&kind),
            None => return Err(de::Error::missing_field("type")),
        };
        if !known {
            return Ok(Command::Unknown(value));
        }
        let command = match Tagged::deserialize(value).map_err(de::Error::custom)? {
            Tagged::Push { layout } => Command::Push { layout },
            Tagged::SetStackRoot { layout } => Command::SetStackRoot { layout },
            Tagged::Pop => Command::Pop,
            Tagged::PopToRoot => Command::PopToRoot,
        };
        Ok(command)
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Command::Push { layout } => TaggedRef::Push { layout }.serialize(serializer),
            Command::SetStackRoot { layout } => {
                TaggedRef::SetStackRoot { layout }.serialize(serializer)
            }
            Command::Pop => TaggedRef::Pop.serialize(serializer),
            Command::PopToRoot => TaggedRef::PopToRoot.serialize(serializer),
            Command::Unknown(value) => value.serialize(serializer),
        }
    }
}
