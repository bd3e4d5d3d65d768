use super::*;

#[test]
fn test_missing_keys_take_defaults() {
    let settings = parse_settings("debugMode = true\n").unwrap();
    assert!(settings.debug_mode);
    assert_eq!(settings.overlay_duration, 2000);
    assert_eq!(settings.dismiss_key, "Escape");
    assert!(settings.audio_enabled);
    assert!(settings.sites.is_empty());
}

#[test]
fn test_site_entries_parse_camel_case() {
    let toml = r##"
overlayDuration = 1500

[[sites]]
id = "wms"
name = "WMS"
urlPattern = '^https://wms\.example\.com/.*'
itemIdSelector = "#product-scan"
statusIdSelector = "#status-scan"
apiUrlPattern = "/api/scan"

[[sites]]
id = "legacy"
urlPattern = "legacy"
enabled = false
"##;
    let settings = parse_settings(toml).unwrap();
    assert_eq!(settings.overlay_duration, 1500);
    assert_eq!(settings.sites.len(), 2);
    assert_eq!(settings.sites[0].url_pattern, r"^https://wms\.example\.com/.*");
    assert!(settings.sites[0].enabled);
    assert!(!settings.sites[1].enabled);
    assert_eq!(settings.sites[1].item_id_selector, DEFAULT_ITEM_ID_SELECTOR);
}

#[test]
fn test_effective_sites_falls_back_to_global_selectors() {
    let settings = Settings {
        item_id_selector: "#sku".into(),
        ..Settings::default()
    };
    let sites = settings.effective_sites();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].url_pattern, ".*");
    assert_eq!(sites[0].item_id_selector, "#sku");
    assert_eq!(sites[0].api_url_pattern, DEFAULT_API_URL_PATTERN);
}

#[test]
fn test_validate_rejects_zero_duration() {
    let settings = Settings {
        overlay_duration: 0,
        ..Settings::default()
    };
    assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_writes_defaults_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("settings.toml");

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings, Settings::default());
    assert!(path.exists());
    assert_eq!(load_settings(&path).unwrap(), Settings::default());
}

#[test]
fn test_load_falls_back_on_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "overlayDuration = [").unwrap();

    assert_eq!(load_settings(&path).unwrap(), Settings::default());
}

#[test]
fn test_save_persists_and_broadcasts() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::open(dir.path().join("settings.toml")).unwrap();
    let mut rx = store.subscribe();

    let mut next = store.current();
    next.audio_enabled = false;
    next.sites.push(SiteConfig {
        id: "wms".into(),
        name: "WMS".into(),
        url_pattern: "wms".into(),
        enabled: true,
        item_id_selector: "#a".into(),
        status_id_selector: "#b".into(),
        api_url_pattern: "/api".into(),
    });
    store.save(next.clone()).unwrap();

    assert_eq!(rx.try_recv().unwrap(), next);
    assert_eq!(store.current(), next);
    assert_eq!(load_settings(store.path()).unwrap(), next);
}

#[test]
fn test_save_rejects_invalid_without_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::open(dir.path().join("settings.toml")).unwrap();
    let mut rx = store.subscribe();

    let bad = Settings {
        audio_volume: 150,
        ..Settings::default()
    };
    assert!(store.save(bad).is_err());
    assert!(rx.try_recv().is_err());
    assert_eq!(store.current(), Settings::default());
}

#[test]
fn test_reload_only_broadcasts_real_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    let store = SettingsStore::open(&path).unwrap();
    let mut rx = store.subscribe();

    assert!(!store.reload().unwrap());
    assert!(rx.try_recv().is_err());

    std::fs::write(&path, "debugMode = true\n").unwrap();
    assert!(store.reload().unwrap());
    assert!(rx.try_recv().unwrap().debug_mode);
}
