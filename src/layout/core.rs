use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NavError, Result};
use crate::identity::{self, InstanceId};

/// Nested layout declaration. Only the parts the navigator understands are
/// typed; a stack root may sit directly under `stack` or inside a side
/// menu's `center`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<LayoutComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<LayoutStack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_menu: Option<Box<LayoutSideMenu>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutStack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub children: Vec<Layout>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSideMenu {
    pub center: Layout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Layout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Layout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutComponent {
    pub name: String,
    /// Ignored by the navigator: every instantiation allocates a fresh id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub pass_props: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_menu: Option<SideMenuOptions>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideMenuOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<SideMenuSideOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<SideMenuSideOptions>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideMenuSideOptions {
    /// Any value other than `false` counts as enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Layout {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// `{ component }`, the shape carried by push commands.
    pub fn component(component: LayoutComponent) -> Self {
        Self {
            component: Some(component),
            ..Self::default()
        }
    }

    /// `{ stack: { children: [{ component }] } }`.
    pub fn single(component: LayoutComponent) -> Self {
        Self {
            stack: Some(LayoutStack {
                id: None,
                children: vec![Self::component(component)],
            }),
            ..Self::default()
        }
    }

    /// `{ sideMenu: { center } }`.
    pub fn side_menu(center: Layout) -> Self {
        Self {
            side_menu: Some(Box::new(LayoutSideMenu {
                center,
                left: None,
                right: None,
            })),
            ..Self::default()
        }
    }

    /// The first component of the side menu's center stack, or of the
    /// direct stack when there is no side menu stack.
    pub fn resolve_root(&self) -> Result<&LayoutComponent> {
        let stack = self
            .side_menu
            .as_ref()
            .and_then(|menu| menu.center.stack.as_ref())
            .or(self.stack.as_ref())
            .ok_or_else(|| NavError::StackNotFound(describe(self)))?;

        stack
            .children
            .first()
            .and_then(|child| child.component.as_ref())
            .ok_or_else(|| NavError::ComponentNotFound(describe(&stack.children)))
    }
}

impl LayoutComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            pass_props: Value::Null,
            options: None,
        }
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.pass_props = props;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = Some(options);
        self
    }

    pub fn instantiate(&self) -> ScreenDescriptor {
        ScreenDescriptor {
            id: identity::allocate(&self.name),
            name: self.name.clone(),
            pass_props: self.pass_props.clone(),
            options: self.options.clone(),
        }
    }
}

impl Options {
    /// Options carrying only `sideMenu.left.enabled`.
    pub fn left_menu_enabled(enabled: bool) -> Self {
        Self {
            side_menu: Some(SideMenuOptions {
                left: Some(SideMenuSideOptions {
                    enabled: Some(Value::Bool(enabled)),
                    extra: Map::new(),
                }),
                ..SideMenuOptions::default()
            }),
            extra: Map::new(),
        }
    }
}

/// One stack entry: a component instantiated with its own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenDescriptor {
    pub name: String,
    pub id: InstanceId,
    #[serde(default)]
    pub pass_props: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

impl ScreenDescriptor {
    /// Whether this entry, when on top, lets the frame render.
    pub fn frame_enabled(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|options| options.side_menu.as_ref())
            .and_then(|menu| menu.left.as_ref())
            .map_or(true, |left| left.enabled != Some(Value::Bool(false)))
    }
}

/// Ordered navigation stack; the last entry is on top.
pub type Stack = Vec<ScreenDescriptor>;

/// Frame visibility for a whole stack. An empty stack keeps the frame.
pub fn frame_enabled(stack: &[ScreenDescriptor]) -> bool {
    stack.last().map_or(true, ScreenDescriptor::frame_enabled)
}

pub(crate) fn describe<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unprintable layout>".to_string())
}
