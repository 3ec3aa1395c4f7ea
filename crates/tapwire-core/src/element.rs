//! Element handles and screen geometry for UI automation.
//!
//! An element handle carries its locator together with its kind: elements in
//! the native accessibility tree are addressed by resource id or XPath, while
//! elements rendered by an embedded reactive UI runtime are addressed through
//! that runtime's own locator protocol (key, widget type, text, tooltip,
//! semantics label). Because the kind is explicit, interaction code dispatches
//! with a plain `match` instead of inspecting the element at runtime.

use serde::{Deserialize, Serialize};

/// Locator for an element in the native accessibility tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NativeLocator {
    /// Resource id / accessibility identifier.
    Id(String),
    /// XPath expression over the native hierarchy.
    Xpath(String),
}

/// Locator for an element rendered by the embedded reactive UI runtime.
///
/// Exactly one locator strategy per element, enforced by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactiveLocator {
    /// Value key assigned to the widget.
    Key(String),
    /// Widget type name.
    Type(String),
    /// Visible text of the widget.
    Text(String),
    /// Tooltip message of the widget.
    Tooltip(String),
    /// Semantics label of the widget.
    Label(String),
    /// Regular expression matched against semantics labels.
    LabelPattern(String),
}

/// A UI element handle: the locator plus its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementHandle {
    /// An element in the native accessibility tree.
    Native(NativeLocator),
    /// An element inside the embedded reactive UI runtime.
    Reactive(ReactiveLocator),
}

impl ElementHandle {
    /// Native element addressed by resource id.
    pub fn native_id(id: impl Into<String>) -> Self {
        Self::Native(NativeLocator::Id(id.into()))
    }

    /// Native element addressed by XPath.
    pub fn native_xpath(xpath: impl Into<String>) -> Self {
        Self::Native(NativeLocator::Xpath(xpath.into()))
    }

    /// Reactive element addressed by value key.
    pub fn by_key(key: impl Into<String>) -> Self {
        Self::Reactive(ReactiveLocator::Key(key.into()))
    }

    /// Reactive element addressed by widget type.
    pub fn by_type(widget_type: impl Into<String>) -> Self {
        Self::Reactive(ReactiveLocator::Type(widget_type.into()))
    }

    /// Reactive element addressed by visible text.
    pub fn by_text(text: impl Into<String>) -> Self {
        Self::Reactive(ReactiveLocator::Text(text.into()))
    }

    /// Reactive element addressed by tooltip.
    pub fn by_tooltip(tooltip: impl Into<String>) -> Self {
        Self::Reactive(ReactiveLocator::Tooltip(tooltip.into()))
    }

    /// Reactive element addressed by semantics label.
    pub fn by_label(label: impl Into<String>) -> Self {
        Self::Reactive(ReactiveLocator::Label(label.into()))
    }

    /// Reactive element addressed by a semantics-label pattern.
    pub fn by_label_pattern(pattern: impl Into<String>) -> Self {
        Self::Reactive(ReactiveLocator::LabelPattern(pattern.into()))
    }

    /// Returns true if this element lives in the reactive UI runtime.
    pub fn is_reactive(&self) -> bool {
        matches!(self, Self::Reactive(_))
    }

    /// Short description of the locator for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Native(NativeLocator::Id(id)) => format!("id={id}"),
            Self::Native(NativeLocator::Xpath(xpath)) => format!("xpath={xpath}"),
            Self::Reactive(ReactiveLocator::Key(key)) => format!("key={key}"),
            Self::Reactive(ReactiveLocator::Type(t)) => format!("type={t}"),
            Self::Reactive(ReactiveLocator::Text(text)) => format!("text={text}"),
            Self::Reactive(ReactiveLocator::Tooltip(tip)) => format!("tooltip={tip}"),
            Self::Reactive(ReactiveLocator::Label(label)) => format!("label={label}"),
            Self::Reactive(ReactiveLocator::LabelPattern(p)) => format!("label~={p}"),
        }
    }
}

/// A point in screen coordinates, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPoint {
    /// The x-coordinate in screen points.
    pub x: i32,
    /// The y-coordinate in screen points.
    pub y: i32,
}

/// Screen dimensions in points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    /// Screen width in points.
    pub width: u32,
    /// Screen height in points.
    pub height: u32,
}
