use std::sync::Arc;

use scan_overlay::client::BackgroundClient;
use scan_overlay::clock::{Clock, ManualClock};
use scan_overlay::config::{Settings, SettingsStore, SiteConfig};
use scan_overlay::content::ContentController;
use scan_overlay::content::interceptor::{
    Fetch, FetchError, FetchRequest, FetchResponse, ObservedFetch,
};
use scan_overlay::content::overlay::TraceAudio;
use scan_overlay::content::page::{DomEvent, DomEventKind, MemoryPage, Page, PageEvent};
use scan_overlay::content::SharedController;
use scan_overlay::messages::{RuntimeMessage, ScanResult};
use scan_overlay::server;
use scan_overlay::state::{AppState, SharedState};
use tokio::sync::mpsc;

fn wms_site() -> SiteConfig {
    SiteConfig {
        id: "wms".into(),
        name: "WMS".into(),
        url_pattern: r"^https://wms\.example\.com/".into(),
        enabled: true,
        item_id_selector: "#product-scan".into(),
        status_id_selector: "#status-scan".into(),
        api_url_pattern: "/api/scan".into(),
    }
}

async fn start_service(clock: Arc<ManualClock>) -> (SharedState, BackgroundClient, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SettingsStore::open(dir.path().join("settings.toml")).unwrap());
    let state = Arc::new(AppState::new(store, clock));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = BackgroundClient::new(format!("http://{addr}")).unwrap();
    (state, client, dir)
}

#[tokio::test]
async fn history_get_and_clear_over_http() {
    let clock = Arc::new(ManualClock::new(5_000));
    let (_state, client, _dir) = start_service(clock).await;

    assert!(client.history().await.unwrap().is_empty());

    client
        .send(&RuntimeMessage::log_scan("SKU123", "OK", ScanResult::Success))
        .await
        .unwrap();
    let history = client.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].item_id, "SKU123");
    assert_eq!(history[0].timestamp, 5_000);

    client.clear_history().await.unwrap();
    assert!(client.history().await.unwrap().is_empty());
}

#[tokio::test]
async fn settings_round_trip_and_site_lookup() {
    let clock = Arc::new(ManualClock::new(0));
    let (state, client, _dir) = start_service(clock).await;
    let mut rx = state.settings.subscribe();

    let settings = Settings {
        sites: vec![wms_site()],
        audio_volume: 80,
        ..Settings::default()
    };
    client.save_settings(&settings).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().audio_volume, 80);
    assert_eq!(client.settings().await.unwrap(), settings);

    let site = client
        .site_config("https://wms.example.com/pick")
        .await
        .unwrap();
    assert_eq!(site.map(|s| s.id), Some("wms".to_string()));
    assert!(client.site_config("https://shop.example.com/").await.unwrap().is_none());

    let bad = Settings {
        audio_volume: 200,
        ..Settings::default()
    };
    assert!(client.save_settings(&bad).await.is_err());
}

struct Responds(u16);

#[async_trait::async_trait]
impl Fetch for Responds {
    async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse {
            status: self.0,
            body: String::new(),
        })
    }
}

#[tokio::test]
async fn page_scans_land_in_background_history() {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let (_state, client, _dir) = start_service(clock.clone()).await;

    let mut page = MemoryPage::new("https://wms.example.com/pick");
    let item = page.add_element("#product-scan");
    let status = page.add_element("#status-scan");

    let (tx, mut outbox) = mpsc::unbounded_channel::<RuntimeMessage>();
    let settings = Settings {
        sites: vec![wms_site()],
        ..Settings::default()
    };
    let mut controller = ContentController::new(
        page,
        settings,
        clock.clone(),
        Box::new(tx),
        Box::new(TraceAudio),
    );
    assert!(controller.init());
    let shared = SharedController::new(controller);

    {
        let mut c = shared.lock();
        for (el, value) in [(item, "SKU123"), (status, "OK")] {
            c.page_mut().set_value(el, value);
            c.handle_event(PageEvent::Dom(DomEvent {
                target: el,
                kind: DomEventKind::Keydown { key: "Enter".into() },
            }));
            clock.advance(500);
        }
    }

    let fetch = ObservedFetch::new(Responds(500), shared.clone());
    let resp = fetch
        .fetch(FetchRequest::post("https://wms.example.com/api/scan", "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status, 500);

    // Forward what the page posted, as the extension runtime would.
    while let Ok(message) = outbox.try_recv() {
        client.send(&message).await.unwrap();
    }

    let history = client.history().await.unwrap();
    let results: Vec<_> = history.iter().map(|e| e.result).collect();
    assert_eq!(
        results,
        vec![ScanResult::Scanned, ScanResult::Scanned, ScanResult::Error]
    );
    assert_eq!(history[2].item_id, "SKU123");
    assert_eq!(history[2].status_id, "OK");
    assert_eq!(history[2].timestamp, clock.now_epoch_ms());
}
