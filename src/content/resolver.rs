//! Picks the site configuration that applies to a page URL.
use regex::Regex;

use crate::config::SiteConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPattern {
    pub site_id: String,
    pub pattern: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct Resolution<'a> {
    pub matched: Option<&'a SiteConfig>,
    /// Enabled entries that were passed over because their pattern does not compile.
    pub skipped: Vec<InvalidPattern>,
}

/// First enabled entry, in list order, whose `urlPattern` matches anywhere in `url`.
pub fn resolve<'a>(url: &str, configs: &'a [SiteConfig]) -> Resolution<'a> {
    let mut resolution = Resolution::default();

    for config in configs.iter().filter(|c| c.enabled) {
        let re = match Regex::new(&config.url_pattern) {
            Ok(re) => re,
            Err(e) => {
                resolution.skipped.push(InvalidPattern {
                    site_id: config.id.clone(),
                    pattern: config.url_pattern.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };
        if re.is_match(url) {
            resolution.matched = Some(config);
            break;
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(id: &str, pattern: &str, enabled: bool) -> SiteConfig {
        SiteConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            url_pattern: pattern.to_string(),
            enabled,
            item_id_selector: "#product-scan".to_string(),
            status_id_selector: "#status-scan".to_string(),
            api_url_pattern: "/api/scan".to_string(),
        }
    }

    #[test]
    fn test_first_match_wins_over_more_specific_later_entry() {
        let configs = vec![
            site("broad", "example\\.com", true),
            site("exact", "^https://wms\\.example\\.com/pick$", true),
        ];
        let res = resolve("https://wms.example.com/pick", &configs);
        assert_eq!(res.matched.map(|c| c.id.as_str()), Some("broad"));
    }

    #[test]
    fn test_disabled_entries_are_never_returned() {
        let configs = vec![site("off", ".*", false), site("on", "wms", true)];
        let res = resolve("https://wms.example.com/", &configs);
        assert_eq!(res.matched.map(|c| c.id.as_str()), Some("on"));

        let only_disabled = vec![site("off", ".*", false)];
        assert!(resolve("https://anything/", &only_disabled).matched.is_none());
    }

    #[test]
    fn test_malformed_pattern_is_skipped_and_recorded() {
        let configs = vec![site("bad", "([unclosed", true), site("good", "wms", true)];
        let res = resolve("https://wms.example.com/", &configs);
        assert_eq!(res.matched.map(|c| c.id.as_str()), Some("good"));
        assert_eq!(res.skipped.len(), 1);
        assert_eq!(res.skipped[0].site_id, "bad");
    }

    #[test]
    fn test_no_match_returns_none() {
        let configs = vec![site("wms", "^https://wms\\.", true)];
        let res = resolve("https://shop.example.com/", &configs);
        assert!(res.matched.is_none());
        assert!(res.skipped.is_empty());
    }

    #[test]
    fn test_wms_pick_page_resolves() {
        let configs = vec![site("wms", "^https://wms\\.example\\.com/.*", true)];
        let res = resolve("https://wms.example.com/pick", &configs);
        assert_eq!(res.matched.map(|c| c.id.as_str()), Some("wms"));
    }
}
