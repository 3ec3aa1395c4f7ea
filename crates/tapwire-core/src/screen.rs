//! Declarative page-object support.
//!
//! A screen (page object) owns a fixed set of named element handles, built
//! once from declarative locator descriptors when the screen is constructed.
//! There is no runtime field scanning: the builder is the single place where
//! locators are declared, and it rejects duplicate names at construction
//! time.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::element::ElementHandle;
use crate::engine::{InteractionEngine, InteractionError};

/// Errors raised while building or querying a screen's elements.
#[derive(Error, Debug)]
pub enum ScreenError {
    /// Two elements were declared under the same name.
    #[error("duplicate element name '{0}'")]
    DuplicateElement(String),

    /// No element was declared under the requested name.
    #[error("no element named '{0}' on this screen")]
    UnknownElement(String),
}

/// The named element handles of one screen.
#[derive(Debug, Clone, Default)]
pub struct ScreenElements {
    elements: BTreeMap<String, ElementHandle>,
}

impl ScreenElements {
    /// Starts a builder.
    pub fn builder() -> ScreenElementsBuilder {
        ScreenElementsBuilder::default()
    }

    /// Looks up an element by name.
    pub fn get(&self, name: &str) -> Result<&ElementHandle, ScreenError> {
        self.elements
            .get(name)
            .ok_or_else(|| ScreenError::UnknownElement(name.to_string()))
    }

    /// Number of declared elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true when no element is declared.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterates over elements in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ElementHandle)> {
        self.elements.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Builder collecting a screen's locator declarations.
#[derive(Debug, Default)]
pub struct ScreenElementsBuilder {
    elements: BTreeMap<String, ElementHandle>,
    duplicate: Option<String>,
}

impl ScreenElementsBuilder {
    /// Declares an element under a unique name.
    pub fn element(mut self, name: impl Into<String>, handle: ElementHandle) -> Self {
        let name = name.into();
        if self.elements.contains_key(&name) {
            self.duplicate.get_or_insert(name);
        } else {
            self.elements.insert(name, handle);
        }
        self
    }

    /// Declares a native element by resource id.
    pub fn native_id(self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.element(name, ElementHandle::native_id(id))
    }

    /// Declares a native element by XPath.
    pub fn native_xpath(self, name: impl Into<String>, xpath: impl Into<String>) -> Self {
        self.element(name, ElementHandle::native_xpath(xpath))
    }

    /// Declares a reactive element by value key.
    pub fn by_key(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.element(name, ElementHandle::by_key(key))
    }

    /// Declares a reactive element by visible text.
    pub fn by_text(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.element(name, ElementHandle::by_text(text))
    }

    /// Declares a reactive element by semantics label.
    pub fn by_label(self, name: impl Into<String>, label: impl Into<String>) -> Self {
        self.element(name, ElementHandle::by_label(label))
    }

    /// Finishes the build.
    ///
    /// # Errors
    ///
    /// [`ScreenError::DuplicateElement`] naming the first duplicate, if any
    /// name was declared twice.
    pub fn build(self) -> Result<ScreenElements, ScreenError> {
        match self.duplicate {
            Some(name) => Err(ScreenError::DuplicateElement(name)),
            None => Ok(ScreenElements {
                elements: self.elements,
            }),
        }
    }
}

/// Contract between a screen and the interaction engine.
///
/// Implementors confirm that the screen on display is the one the page
/// object models before test steps drive it.
#[async_trait]
pub trait Screen {
    /// The screen's declared elements.
    fn elements(&self) -> &ScreenElements;

    /// Checks that the screen currently on display matches this page object.
    async fn is_view(&self, engine: &InteractionEngine) -> Result<bool, InteractionError>;
}
