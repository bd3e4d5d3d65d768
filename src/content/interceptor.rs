//! Observation of the page's own API calls. Requests always run and their results always
//! reach the page unchanged; matching calls additionally report their outcome to a
//! `NetworkObserver`.
use async_trait::async_trait;
use tracing::debug;

use crate::config::SiteConfig;

#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("network observer already installed for site {0}; tear it down first")]
    AlreadyInstalled(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptRule {
    pub site_id: String,
    pub api_url_pattern: String,
}

impl InterceptRule {
    pub fn matches(&self, url: &str) -> bool {
        !self.api_url_pattern.is_empty() && url.contains(&self.api_url_pattern)
    }
}

/// Handle for one observed request. Only honoured while the rule it was issued under is
/// still installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub generation: u64,
    pub seq: u64,
}

/// Holds the single active rule. Installing over an existing rule is refused, so
/// reconfiguration has to go through `teardown` and can never stack observers.
#[derive(Debug, Default)]
pub struct Interceptor {
    rule: Option<InterceptRule>,
    generation: u64,
    issued: u64,
}

impl Interceptor {
    pub fn install(&mut self, config: &SiteConfig) -> Result<(), InterceptError> {
        if let Some(rule) = &self.rule {
            return Err(InterceptError::AlreadyInstalled(rule.site_id.clone()));
        }
        self.generation += 1;
        self.rule = Some(InterceptRule {
            site_id: config.id.clone(),
            api_url_pattern: config.api_url_pattern.clone(),
        });
        debug!(site = %config.id, pattern = %config.api_url_pattern, "network observer installed");
        Ok(())
    }

    pub fn teardown(&mut self) -> Option<InterceptRule> {
        let rule = self.rule.take();
        if let Some(rule) = &rule {
            debug!(site = %rule.site_id, "network observer removed");
        }
        rule
    }

    pub fn rule(&self) -> Option<&InterceptRule> {
        self.rule.as_ref()
    }

    pub fn matches(&self, url: &str) -> bool {
        self.rule.as_ref().is_some_and(|r| r.matches(url))
    }

    pub fn issue_ticket(&mut self) -> RequestTicket {
        self.issued += 1;
        RequestTicket {
            generation: self.generation,
            seq: self.issued,
        }
    }

    /// False once the rule the ticket was issued under has been torn down.
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.rule.is_some() && ticket.generation == self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Response { status: u16 },
    Failed { message: String },
}

impl RequestOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, RequestOutcome::Response { status } if (200..300).contains(status))
    }
}

pub trait NetworkObserver: Send + Sync {
    /// URL filter, evaluated when the request is opened.
    fn matches(&self, url: &str) -> bool;
    /// Called when a matching request is dispatched. `None` means "do not observe".
    fn arm(&self, url: &str) -> Option<RequestTicket>;
    fn settle(&self, ticket: RequestTicket, outcome: &RequestOutcome);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            body: Some(body.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request aborted")]
    Aborted,
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Fetch wrapper. Unmatched calls go straight through.
pub struct ObservedFetch<F, O> {
    inner: F,
    observer: O,
}

impl<F, O> ObservedFetch<F, O> {
    pub fn new(inner: F, observer: O) -> Self {
        Self { inner, observer }
    }
}

#[async_trait]
impl<F: Fetch, O: NetworkObserver> Fetch for ObservedFetch<F, O> {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let ticket = if self.observer.matches(&request.url) {
            self.observer.arm(&request.url)
        } else {
            None
        };
        let Some(ticket) = ticket else {
            return self.inner.fetch(request).await;
        };

        let result = self.inner.fetch(request).await;
        let outcome = match &result {
            Ok(resp) => RequestOutcome::Response {
                status: resp.status,
            },
            Err(e) => RequestOutcome::Failed {
                message: e.to_string(),
            },
        };
        self.observer.settle(ticket, &outcome);
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XhrCompletion {
    Load { status: u16, body: String },
    Error { message: String },
}

pub type XhrHandler = Box<dyn FnMut(&XhrCompletion) + Send>;

/// XHR wrapper: `open` records relevance, `send` arms, `complete` reports and then hands the
/// completion to the page's own handler.
pub struct ObservedXhr<O> {
    observer: O,
    url: Option<String>,
    relevant: bool,
    ticket: Option<RequestTicket>,
    onload: Option<XhrHandler>,
    onerror: Option<XhrHandler>,
}

impl<O: NetworkObserver> ObservedXhr<O> {
    pub fn new(observer: O) -> Self {
        Self {
            observer,
            url: None,
            relevant: false,
            ticket: None,
            onload: None,
            onerror: None,
        }
    }

    pub fn open(&mut self, _method: &str, url: &str) {
        self.relevant = self.observer.matches(url);
        self.url = Some(url.to_string());
        self.ticket = None;
    }

    pub fn set_onload(&mut self, handler: XhrHandler) {
        self.onload = Some(handler);
    }

    pub fn set_onerror(&mut self, handler: XhrHandler) {
        self.onerror = Some(handler);
    }

    pub fn send(&mut self) {
        if !self.relevant {
            return;
        }
        if let Some(url) = &self.url {
            self.ticket = self.observer.arm(url);
        }
    }

    pub fn complete(&mut self, completion: XhrCompletion) {
        if let Some(ticket) = self.ticket.take() {
            let outcome = match &completion {
                XhrCompletion::Load { status, .. } => RequestOutcome::Response { status: *status },
                XhrCompletion::Error { message } => RequestOutcome::Failed {
                    message: message.clone(),
                },
            };
            self.observer.settle(ticket, &outcome);
        }

        let handler = match completion {
            XhrCompletion::Load { .. } => self.onload.as_mut(),
            XhrCompletion::Error { .. } => self.onerror.as_mut(),
        };
        if let Some(handler) = handler {
            handler(&completion);
        }
    }
}

#[cfg(test)]
#[path = "interceptor_tests.rs"]
mod tests;
