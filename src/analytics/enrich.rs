//! Pluggable enrichment for hit events: geography and user-agent class.
//!
//! Both lookups are best-effort. A miss produces None fields on the event
//! and never fails the redirect path.

use woothee::parser::Parser;

#[derive(Debug, Clone, Default)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub city: Option<String>,
}

/// IP to geography resolution. The service treats this as an external
/// collaborator; the default implementation resolves nothing.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: &str) -> GeoInfo;
}

/// Ships by default; every lookup misses.
pub struct NoopGeoLookup;

impl GeoLookup for NoopGeoLookup {
    fn lookup(&self, _ip: &str) -> GeoInfo {
        GeoInfo::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentInfo {
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
}

/// User-agent string classification.
pub trait AgentParser: Send + Sync {
    fn parse(&self, user_agent: &str) -> AgentInfo;
}

/// woothee-backed classifier.
pub struct WootheeAgentParser {
    parser: Parser,
}

impl WootheeAgentParser {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    fn device_type_for(category: &str) -> Option<&'static str> {
        match category {
            "pc" => Some("desktop"),
            "smartphone" | "mobilephone" => Some("mobile"),
            "appliance" => Some("appliance"),
            "crawler" => Some("bot"),
            _ => None,
        }
    }
}

impl Default for WootheeAgentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentParser for WootheeAgentParser {
    fn parse(&self, user_agent: &str) -> AgentInfo {
        match self.parser.parse(user_agent) {
            Some(result) => AgentInfo {
                device_type: Self::device_type_for(result.category).map(str::to_string),
                browser: (result.name != "UNKNOWN").then(|| result.name.to_string()),
                os: (result.os != "UNKNOWN").then(|| result.os.to_string()),
            },
            None => AgentInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_geo_resolves_nothing() {
        let geo = NoopGeoLookup.lookup("203.0.113.9");
        assert!(geo.country.is_none());
        assert!(geo.city.is_none());
    }

    #[test]
    fn test_desktop_chrome_classification() {
        let parser = WootheeAgentParser::new();
        let info = parser.parse(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        );
        assert_eq!(info.device_type.as_deref(), Some("desktop"));
        assert_eq!(info.browser.as_deref(), Some("Chrome"));
    }

    #[test]
    fn test_gibberish_produces_empty_info() {
        let parser = WootheeAgentParser::new();
        let info = parser.parse("definitely not a browser");
        assert!(info.device_type.is_none());
        assert!(info.browser.is_none());
    }

    #[test]
    fn test_crawler_maps_to_bot() {
        let parser = WootheeAgentParser::new();
        let info = parser.parse(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
        );
        assert_eq!(info.device_type.as_deref(), Some("bot"));
    }
}
