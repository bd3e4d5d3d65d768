//! Host page abstraction. The content controller only sees the page through `Page`, so it can
//! run against a real DOM bridge or the in-memory `MemoryPage`.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::overlay::OverlayView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("unexpected page structure: {0}")]
    Structure(String),
    #[error("element {0:?} is gone")]
    Detached(ElementId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DomEventKind {
    Input,
    Change,
    Blur,
    Keydown { key: String },
    Click,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomEvent {
    pub target: ElementId,
    #[serde(flatten)]
    pub kind: DomEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    /// Nodes were added or removed; monitored elements may have become available.
    ElementsChanged,
    Dom(DomEvent),
    FormSubmit { form: ElementId },
}

pub trait Page: Send {
    fn url(&self) -> String;
    fn query(&self, selector: &str) -> Option<ElementId>;
    fn value(&self, element: ElementId) -> Option<String>;
    fn set_value(&mut self, element: ElementId, value: &str);
    fn focus_and_select(&mut self, element: ElementId);
    fn form_contains(&self, form: ElementId, element: ElementId) -> bool;
    /// Looks the scanned pair up in the page's own data (row or option lists).
    fn validate_scan(&self, item_id: &str, status_id: &str) -> Result<bool, PageError>;
    fn mount_overlay(&mut self, view: &OverlayView);
    fn unmount_overlay(&mut self);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryElement {
    pub selector: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub form: Option<ElementId>,
}

/// Validation data the page exposes. `None` means the page has no lookup table, which the
/// validator reports as a structure error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCatalog {
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
}

/// In-memory page used by `replay` and tests.
#[derive(Debug, Default)]
pub struct MemoryPage {
    url: String,
    next_id: u64,
    elements: HashMap<ElementId, MemoryElement>,
    catalog: Option<MemoryCatalog>,
    overlays: Vec<OverlayView>,
    focused: Option<ElementId>,
    selected: Option<ElementId>,
}

impl MemoryPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn add_element(&mut self, selector: &str) -> ElementId {
        self.insert(MemoryElement {
            selector: selector.to_string(),
            ..Default::default()
        })
    }

    pub fn add_element_in_form(&mut self, selector: &str, form: ElementId) -> ElementId {
        self.insert(MemoryElement {
            selector: selector.to_string(),
            value: String::new(),
            form: Some(form),
        })
    }

    pub fn insert(&mut self, element: MemoryElement) -> ElementId {
        self.next_id += 1;
        let id = ElementId(self.next_id);
        self.elements.insert(id, element);
        id
    }

    pub fn remove_element(&mut self, id: ElementId) {
        self.elements.remove(&id);
    }

    pub fn set_catalog(&mut self, catalog: Option<MemoryCatalog>) {
        self.catalog = catalog;
    }

    pub fn overlays(&self) -> &[OverlayView] {
        &self.overlays
    }

    pub fn focused(&self) -> Option<ElementId> {
        self.focused
    }

    pub fn selected(&self) -> Option<ElementId> {
        self.selected
    }
}

impl Page for MemoryPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn query(&self, selector: &str) -> Option<ElementId> {
        // Lowest id first, like document order for elements appended in sequence.
        self.elements
            .iter()
            .filter(|(_, el)| el.selector == selector)
            .map(|(id, _)| *id)
            .min()
    }

    fn value(&self, element: ElementId) -> Option<String> {
        self.elements.get(&element).map(|el| el.value.clone())
    }

    fn set_value(&mut self, element: ElementId, value: &str) {
        if let Some(el) = self.elements.get_mut(&element) {
            el.value = value.to_string();
        }
    }

    fn focus_and_select(&mut self, element: ElementId) {
        if self.elements.contains_key(&element) {
            self.focused = Some(element);
            self.selected = Some(element);
        }
    }

    fn form_contains(&self, form: ElementId, element: ElementId) -> bool {
        self.elements
            .get(&element)
            .is_some_and(|el| el.form == Some(form))
    }

    fn validate_scan(&self, item_id: &str, status_id: &str) -> Result<bool, PageError> {
        let catalog = self
            .catalog
            .as_ref()
            .ok_or_else(|| PageError::Structure("no scan table on page".into()))?;
        Ok(catalog.items.iter().any(|i| i == item_id)
            && catalog.statuses.iter().any(|s| s == status_id))
    }

    fn mount_overlay(&mut self, view: &OverlayView) {
        self.overlays.push(view.clone());
    }

    fn unmount_overlay(&mut self) {
        self.overlays.clear();
    }
}
