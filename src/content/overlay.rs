//! Full-viewport feedback panels. One overlay at a time; a new one always replaces the old.
use serde::Serialize;
use tracing::debug;

use crate::config::{ColorScheme, Settings};
use crate::messages::{OverlayKind, OverlayPayload, PageSignal};

pub const OVERLAY_ID: &str = "scan-overlay-extension-overlay";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCue {
    Scan,
    Warning,
    Success,
    Error,
}

impl AudioCue {
    pub fn for_kind(kind: OverlayKind) -> Self {
        match kind {
            OverlayKind::Scan => AudioCue::Scan,
            OverlayKind::Presubmit => AudioCue::Warning,
            OverlayKind::Success => AudioCue::Success,
            OverlayKind::Error => AudioCue::Error,
        }
    }

    pub fn asset(self) -> &'static str {
        match self {
            AudioCue::Scan => "audio/scan.mp3",
            AudioCue::Warning => "audio/warning.mp3",
            AudioCue::Success => "audio/success.mp3",
            AudioCue::Error => "audio/error.mp3",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("audio playback failed: {0}")]
pub struct AudioError(pub String);

pub trait AudioSink: Send {
    fn play(&mut self, cue: AudioCue, volume: u8) -> Result<(), AudioError>;
}

/// Sink that only traces what would have played.
#[derive(Debug, Default)]
pub struct TraceAudio;

impl AudioSink for TraceAudio {
    fn play(&mut self, cue: AudioCue, volume: u8) -> Result<(), AudioError> {
        debug!(asset = cue.asset(), volume, "audio cue");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayView {
    pub kind: OverlayKind,
    pub classes: Vec<String>,
    pub rows: Vec<(String, String)>,
    pub banner: Option<String>,
    pub progress: Option<usize>,
}

impl OverlayView {
    pub fn render(signal: &PageSignal, scheme: ColorScheme) -> Self {
        let kind = signal.kind();
        let p = signal.payload();
        let text = |v: &Option<String>| v.clone().unwrap_or_default();

        let (color, rows, banner) = match kind {
            OverlayKind::Scan => ("red", vec![("Scanned:".to_string(), text(&p.value))], None),
            OverlayKind::Presubmit => (
                "amber",
                pair_rows(p),
                Some("Ready to submit".to_string()),
            ),
            OverlayKind::Success => ("green", pair_rows(p), Some("Success!".to_string())),
            OverlayKind::Error => ("red", vec![("Error:".to_string(), error_text(p))], None),
        };

        let mut classes = vec!["soe-overlay".to_string(), format!("soe-overlay-{color}")];
        if scheme == ColorScheme::HighContrast {
            classes.push("soe-high-contrast".to_string());
        }

        Self {
            kind,
            classes,
            rows,
            banner,
            progress: p.progress,
        }
    }

    pub fn to_html(&self) -> String {
        let mut body = String::new();
        if self.kind == OverlayKind::Success {
            if let Some(banner) = &self.banner {
                body.push_str(&format!(r#"<span class="soe-label">{}</span><br>"#, escape(banner)));
            }
        }
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|(label, value)| {
                format!(
                    r#"<span class="soe-label">{}</span><span class="soe-value">{}</span>"#,
                    escape(label),
                    escape(value)
                )
            })
            .collect();
        body.push_str(&rows.join("<br>"));
        if self.kind == OverlayKind::Presubmit {
            if let Some(banner) = &self.banner {
                body.push_str(&format!(r#"<div class="soe-confirm">{}</div>"#, escape(banner)));
            }
        }
        if let Some(progress) = self.progress {
            body.push_str(&format!(r#"<div class="soe-progress">Scan #{progress}</div>"#));
        }
        format!(
            r#"<div id="{OVERLAY_ID}" class="{}" role="alertdialog" aria-live="assertive"><div class="soe-overlay-content">{body}</div></div>"#,
            self.classes.join(" ")
        )
    }
}

fn pair_rows(p: &OverlayPayload) -> Vec<(String, String)> {
    vec![
        ("Item ID:".into(), p.item_id.clone().unwrap_or_default()),
        ("Status ID:".into(), p.status_id.clone().unwrap_or_default()),
    ]
}

fn error_text(p: &OverlayPayload) -> String {
    match (&p.error, p.status) {
        (Some(err), Some(status)) => format!("{err} ({status})"),
        (Some(err), None) => err.clone(),
        (None, Some(status)) => status.to_string(),
        (None, None) => "Unknown error".to_string(),
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug)]
struct ActiveOverlay {
    view: OverlayView,
    dismiss_at_ms: Option<i64>,
}

pub struct OverlayPresenter {
    duration_ms: i64,
    dismiss_key: String,
    audio_enabled: bool,
    audio_volume: u8,
    scheme: ColorScheme,
    audio: Box<dyn AudioSink>,
    active: Option<ActiveOverlay>,
}

impl OverlayPresenter {
    pub fn new(settings: &Settings, audio: Box<dyn AudioSink>) -> Self {
        let mut presenter = Self {
            duration_ms: 0,
            dismiss_key: String::new(),
            audio_enabled: false,
            audio_volume: 0,
            scheme: ColorScheme::Default,
            audio,
            active: None,
        };
        presenter.apply_settings(settings);
        presenter
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.duration_ms = i64::try_from(settings.overlay_duration).unwrap_or(i64::MAX);
        self.dismiss_key = settings.dismiss_key.clone();
        self.audio_enabled = settings.audio_enabled;
        self.audio_volume = settings.audio_volume;
        self.scheme = settings.color_scheme;
    }

    pub fn active(&self) -> Option<&OverlayView> {
        self.active.as_ref().map(|a| &a.view)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn dismiss_key(&self) -> &str {
        &self.dismiss_key
    }

    /// Replaces whatever is showing. Error overlays get no expiry.
    pub fn show(&mut self, signal: &PageSignal, now_ms: i64) -> &OverlayView {
        let view = OverlayView::render(signal, self.scheme);
        let dismiss_at_ms = match view.kind {
            OverlayKind::Error => None,
            _ => Some(now_ms.saturating_add(self.duration_ms)),
        };

        if self.audio_enabled {
            let cue = AudioCue::for_kind(view.kind);
            if let Err(e) = self.audio.play(cue, self.audio_volume) {
                debug!(error = %e, asset = cue.asset(), "audio cue skipped");
            }
        }

        let active = self.active.insert(ActiveOverlay {
            view,
            dismiss_at_ms,
        });
        &active.view
    }

    /// Drops an expired overlay. Returns whether one was removed.
    pub fn expire(&mut self, now_ms: i64) -> bool {
        let expired = self
            .active
            .as_ref()
            .and_then(|a| a.dismiss_at_ms)
            .is_some_and(|at| now_ms >= at);
        if expired {
            self.active = None;
        }
        expired
    }

    pub fn on_key(&mut self, key: &str) -> bool {
        key == self.dismiss_key && self.dismiss()
    }

    pub fn dismiss(&mut self) -> bool {
        self.active.take().is_some()
    }
}

#[cfg(test)]
#[path = "overlay_tests.rs"]
mod tests;
