//! Passive listeners on the two scan fields and the save button.
use std::collections::HashSet;

use tracing::debug;

use super::page::{DomEvent, DomEventKind, ElementId, Page};
use super::scan::ScanField;
use crate::config::SiteConfig;

/// The save button is the same on every supported page.
pub const SAVE_BUTTON_SELECTOR: &str = "#save-button";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listen {
    Input,
    Change,
    Blur,
    EnterKey,
    Click,
}

const FIELD_EVENTS: [Listen; 4] = [Listen::Input, Listen::Change, Listen::Blur, Listen::EnterKey];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Listener {
    element: ElementId,
    on: Listen,
    role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Field(ScanField),
    SaveButton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldBindings {
    pub item: ElementId,
    pub status: ElementId,
    pub save: Option<ElementId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInput {
    pub field: ScanField,
    pub value: String,
    pub submit_intent: bool,
}

#[derive(Debug, Default)]
pub struct FieldMonitor {
    instrumented: HashSet<ElementId>,
    listeners: Vec<Listener>,
    bindings: Option<FieldBindings>,
}

impl FieldMonitor {
    pub fn bindings(&self) -> Option<FieldBindings> {
        self.bindings
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Finds the configured fields and instruments any that are new. Returns false, without
    /// touching anything, while either field is missing.
    pub fn attach<P: Page + ?Sized>(&mut self, page: &P, config: &SiteConfig) -> bool {
        let (Some(item), Some(status)) = (
            page.query(&config.item_id_selector),
            page.query(&config.status_id_selector),
        ) else {
            debug!(
                item = %config.item_id_selector,
                status = %config.status_id_selector,
                "scan fields not on page yet"
            );
            return false;
        };

        self.instrument(item, Role::Field(ScanField::ItemId), &FIELD_EVENTS);
        self.instrument(status, Role::Field(ScanField::StatusId), &FIELD_EVENTS);
        let save = page.query(SAVE_BUTTON_SELECTOR);
        if let Some(save) = save {
            self.instrument(save, Role::SaveButton, &[Listen::Click]);
        }

        self.bindings = Some(FieldBindings { item, status, save });
        true
    }

    fn instrument(&mut self, element: ElementId, role: Role, events: &[Listen]) {
        if !self.instrumented.insert(element) {
            return;
        }
        self.listeners.extend(events.iter().map(|&on| Listener { element, on, role }));
        debug!(?element, ?role, "listeners attached");
    }

    pub fn detach_all(&mut self) {
        self.instrumented.clear();
        self.listeners.clear();
        self.bindings = None;
    }

    /// Runs every listener registered for the event's target. Listeners only read; the
    /// event keeps its default action and propagation.
    pub fn route<P: Page + ?Sized>(&self, page: &P, event: &DomEvent) -> Vec<FieldInput> {
        self.listeners
            .iter()
            .filter(|l| l.element == event.target && listens_for(l.on, &event.kind))
            .filter_map(|l| self.to_input(page, l))
            .collect()
    }

    fn to_input<P: Page + ?Sized>(&self, page: &P, listener: &Listener) -> Option<FieldInput> {
        match listener.role {
            Role::Field(field) => Some(FieldInput {
                field,
                value: page.value(listener.element)?,
                submit_intent: listener.on == Listen::EnterKey,
            }),
            Role::SaveButton => {
                let status = self.bindings?.status;
                Some(FieldInput {
                    field: ScanField::StatusId,
                    value: page.value(status)?,
                    submit_intent: true,
                })
            }
        }
    }
}

fn listens_for(on: Listen, kind: &DomEventKind) -> bool {
    match (on, kind) {
        (Listen::Input, DomEventKind::Input)
        | (Listen::Change, DomEventKind::Change)
        | (Listen::Blur, DomEventKind::Blur)
        | (Listen::Click, DomEventKind::Click) => true,
        (Listen::EnterKey, DomEventKind::Keydown { key }) => key == "Enter",
        _ => false,
    }
}
