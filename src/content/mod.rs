//! Page-side core of the scan overlay: one controller per page owns the resolved site, the
//! scan state and every component that reads or changes them.
pub mod debounce;
pub mod interceptor;
pub mod monitor;
pub mod overlay;
pub mod page;
pub mod resolver;
pub mod scan;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::{Settings, SiteConfig};
use crate::messages::{OverlayPayload, PageSignal, RuntimeMessage, ScanResult};

use debounce::{InputDebouncer, InputOutcome};
use interceptor::{Interceptor, NetworkObserver, RequestOutcome, RequestTicket};
use monitor::{FieldInput, FieldMonitor};
use overlay::{AudioSink, OverlayPresenter};
use page::{DomEvent, DomEventKind, ElementId, Page, PageEvent};
use scan::{ScanField, ScanState};

/// Delay between a submission outcome and emptying the scan fields, so the outcome overlay
/// renders the submitted pair first.
pub const FIELD_CLEAR_DELAY_MS: i64 = 100;

/// Fire-and-forget channel to the background service.
pub trait RuntimeChannel: Send {
    fn post(&self, message: RuntimeMessage);
}

impl RuntimeChannel for mpsc::UnboundedSender<RuntimeMessage> {
    fn post(&self, message: RuntimeMessage) {
        if mpsc::UnboundedSender::send(self, message).is_err() {
            debug!("background channel closed, scan not logged");
        }
    }
}

pub struct ContentController<P: Page> {
    page: P,
    clock: Arc<dyn Clock>,
    settings: Settings,
    site: Option<SiteConfig>,
    scan: ScanState,
    debouncer: InputDebouncer,
    monitor: FieldMonitor,
    interceptor: Interceptor,
    overlay: OverlayPresenter,
    runtime: Box<dyn RuntimeChannel>,
    signals: broadcast::Sender<PageSignal>,
    clear_at_ms: Option<i64>,
}

impl<P: Page> ContentController<P> {
    pub fn new(
        page: P,
        settings: Settings,
        clock: Arc<dyn Clock>,
        runtime: Box<dyn RuntimeChannel>,
        audio: Box<dyn AudioSink>,
    ) -> Self {
        let (signals, _) = broadcast::channel(64);
        let overlay = OverlayPresenter::new(&settings, audio);
        Self {
            page,
            clock,
            settings,
            site: None,
            scan: ScanState::default(),
            debouncer: InputDebouncer::default(),
            monitor: FieldMonitor::default(),
            interceptor: Interceptor::default(),
            overlay,
            runtime,
            signals,
            clear_at_ms: None,
        }
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<PageSignal> {
        self.signals.subscribe()
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scan_state(&self) -> &ScanState {
        &self.scan
    }

    pub fn overlay(&self) -> &OverlayPresenter {
        &self.overlay
    }

    pub fn monitor(&self) -> &FieldMonitor {
        &self.monitor
    }

    pub fn current_site_config(&self) -> Option<&SiteConfig> {
        self.site.as_ref()
    }

    /// Resolves the site for the current URL and starts monitoring. Returns whether a site
    /// configuration applies to this page.
    pub fn init(&mut self) -> bool {
        self.bind()
    }

    /// Drops everything bound to the old settings and binds again from scratch.
    pub fn update_settings(&mut self, settings: Settings) {
        self.unbind();
        self.settings = settings;
        self.overlay.apply_settings(&self.settings);
        if self.settings.debug_mode {
            debug!(settings = ?self.settings, "settings updated");
        }
        self.bind();
    }

    fn bind(&mut self) -> bool {
        let url = self.page.url();
        let sites = self.settings.effective_sites();
        let resolution = resolver::resolve(&url, &sites);
        for skipped in &resolution.skipped {
            if self.settings.debug_mode {
                warn!(site = %skipped.site_id, pattern = %skipped.pattern, error = %skipped.error, "invalid urlPattern skipped");
            } else {
                trace!(site = %skipped.site_id, "invalid urlPattern skipped");
            }
        }
        self.site = resolution.matched.cloned();

        let Some(site) = &self.site else {
            debug!(%url, "no site configuration matches");
            return false;
        };
        info!(site = %site.id, %url, "site configuration active");

        if let Err(e) = self.interceptor.install(site) {
            warn!(error = %e, "network observer not installed");
        }
        if !self.monitor.attach(&self.page, site) {
            debug!("scan fields not present yet, waiting for page changes");
        }
        true
    }

    fn unbind(&mut self) {
        self.interceptor.teardown();
        self.monitor.detach_all();
        self.debouncer.reset();
        self.scan.reset();
        self.clear_at_ms = None;
        self.site = None;
    }

    pub fn handle_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::ElementsChanged => {
                if let Some(site) = &self.site {
                    if self.monitor.attach(&self.page, site) && self.settings.debug_mode {
                        debug!("scan fields found after page change");
                    }
                }
            }
            PageEvent::Dom(event) => self.on_dom_event(event),
            PageEvent::FormSubmit { form } => self.on_form_submit(form),
        }
    }

    fn on_dom_event(&mut self, event: DomEvent) {
        if let DomEventKind::Keydown { key } = &event.kind {
            if self.overlay.on_key(key) {
                self.after_dismiss();
            }
        }
        for input in self.monitor.route(&self.page, &event) {
            self.on_input(input);
        }
    }

    fn on_input(&mut self, input: FieldInput) {
        let now = self.clock.now_epoch_ms();
        let outcome = self.debouncer.handle(
            &mut self.scan,
            input.field,
            &input.value,
            input.submit_intent,
            now,
        );
        if self.settings.debug_mode {
            debug!(field = ?input.field, value = %input.value, ?outcome, "scan input");
        }

        match outcome {
            InputOutcome::Debounced | InputOutcome::Updated => {}
            InputOutcome::SubmitIncomplete => {
                self.show(PageSignal::ShowScanOverlay(OverlayPayload {
                    value: Some(input.value),
                    progress: Some(self.scan.progress()),
                    ..Default::default()
                }));
                self.log_scan(ScanResult::Scanned);
            }
            InputOutcome::SubmitReady => self.on_submit_ready(),
        }
    }

    fn on_submit_ready(&mut self) {
        let valid = match self
            .page
            .validate_scan(&self.scan.item_id, &self.scan.status_id)
        {
            Ok(valid) => valid,
            Err(e) => {
                debug!(error = %e, "page validation unavailable, accepting scan");
                true
            }
        };

        if !valid {
            let error = format!(
                "Scan not found on page: {} / {}",
                self.scan.item_id, self.scan.status_id
            );
            self.show(PageSignal::ShowErrorOverlay(OverlayPayload {
                error: Some(error),
                progress: Some(self.scan.progress()),
                ..Default::default()
            }));
            return;
        }

        self.show(self.presubmit_signal());
        self.log_scan(ScanResult::Scanned);
    }

    fn on_form_submit(&mut self, form: ElementId) {
        if !self.settings.intercept_form_submit {
            return;
        }
        let Some(bindings) = self.monitor.bindings() else {
            return;
        };
        if !self.page.form_contains(form, bindings.item)
            && !self.page.form_contains(form, bindings.status)
        {
            return;
        }

        let item = self.page.value(bindings.item).unwrap_or_default();
        let status = self.page.value(bindings.status).unwrap_or_default();
        self.scan.item_id = item;
        self.scan.status_id = status;
        debug!(item = %self.scan.item_id, status = %self.scan.status_id, "form submit observed");

        self.log_scan(ScanResult::Scanned);
        self.show(self.presubmit_signal());
    }

    /// Expires overlays and performs a pending field clear.
    pub fn tick(&mut self) {
        let now = self.clock.now_epoch_ms();
        if self.overlay.expire(now) {
            self.after_dismiss();
        }
        if self.clear_at_ms.is_some_and(|at| now >= at) {
            self.clear_at_ms = None;
            self.clear_scan_fields();
        }
    }

    pub fn request_matches(&self, url: &str) -> bool {
        self.interceptor.matches(url)
    }

    pub fn arm_request(&mut self, url: &str) -> Option<RequestTicket> {
        if !self.interceptor.matches(url) || !self.scan.is_complete() {
            return None;
        }
        let ticket = self.interceptor.issue_ticket();
        debug!(?ticket, %url, "observing API call");
        Some(ticket)
    }

    pub fn settle_request(&mut self, ticket: RequestTicket, outcome: &RequestOutcome) {
        if !self.interceptor.is_current(ticket) {
            debug!(?ticket, ?outcome, "API call settled after teardown, ignored");
            return;
        }
        debug!(?ticket, ?outcome, "API call settled");
        let progress = Some(self.scan.progress());

        if outcome.is_ok() {
            self.show(PageSignal::ShowSuccessOverlay(OverlayPayload {
                item_id: Some(self.scan.item_id.clone()),
                status_id: Some(self.scan.status_id.clone()),
                progress,
                ..Default::default()
            }));
            self.log_scan(ScanResult::Success);
        } else {
            let payload = match outcome {
                RequestOutcome::Response { status } => OverlayPayload {
                    error: Some("API Error".to_string()),
                    status: Some(*status),
                    progress,
                    ..Default::default()
                },
                RequestOutcome::Failed { message } => OverlayPayload {
                    error: Some(message.clone()),
                    progress,
                    ..Default::default()
                },
            };
            self.show(PageSignal::ShowErrorOverlay(payload));
            self.log_scan(ScanResult::Error);
        }

        self.clear_at_ms = Some(self.clock.now_epoch_ms() + FIELD_CLEAR_DELAY_MS);
    }

    fn presubmit_signal(&self) -> PageSignal {
        PageSignal::ShowPresubmitOverlay(OverlayPayload {
            item_id: Some(self.scan.item_id.clone()),
            status_id: Some(self.scan.status_id.clone()),
            progress: Some(self.scan.progress()),
            ..Default::default()
        })
    }

    fn show(&mut self, signal: PageSignal) {
        let now = self.clock.now_epoch_ms();
        self.page.unmount_overlay();
        let view = self.overlay.show(&signal, now);
        self.page.mount_overlay(view);
        self.scan.overlay_active = true;
        let _ = self.signals.send(signal);
    }

    fn after_dismiss(&mut self) {
        self.page.unmount_overlay();
        self.scan.overlay_active = false;
        if !self.settings.auto_focus_after_scan {
            return;
        }
        if let Some(bindings) = self.monitor.bindings() {
            self.page.focus_and_select(bindings.item);
        }
    }

    fn log_scan(&self, result: ScanResult) {
        self.runtime.post(RuntimeMessage::log_scan(
            &self.scan.item_id,
            &self.scan.status_id,
            result,
        ));
    }

    fn clear_scan_fields(&mut self) {
        if let Some(bindings) = self.monitor.bindings() {
            self.page.set_value(bindings.item, "");
            self.page.set_value(bindings.status, "");
        }
        self.scan.clear_fields();
    }

    /// Current value of one of the monitored fields as the page shows it.
    pub fn field_value(&self, field: ScanField) -> Option<String> {
        let bindings = self.monitor.bindings()?;
        let element = match field {
            ScanField::ItemId => bindings.item,
            ScanField::StatusId => bindings.status,
        };
        self.page.value(element)
    }
}

/// Cross-context handle on a page's controller. Also the network observer handed to the
/// fetch and XHR wrappers.
pub struct SharedController<P: Page>(Arc<Mutex<ContentController<P>>>);

impl<P: Page> Clone for SharedController<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P: Page> SharedController<P> {
    pub fn new(controller: ContentController<P>) -> Self {
        Self(Arc::new(Mutex::new(controller)))
    }

    pub fn lock(&self) -> MutexGuard<'_, ContentController<P>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn update_settings(&self, settings: Settings) {
        self.lock().update_settings(settings);
    }

    pub fn current_site_config(&self) -> Option<SiteConfig> {
        self.lock().current_site_config().cloned()
    }
}

impl<P: Page> NetworkObserver for SharedController<P> {
    fn matches(&self, url: &str) -> bool {
        self.lock().request_matches(url)
    }

    fn arm(&self, url: &str) -> Option<RequestTicket> {
        self.lock().arm_request(url)
    }

    fn settle(&self, ticket: RequestTicket, outcome: &RequestOutcome) {
        self.lock().settle_request(ticket, outcome);
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
