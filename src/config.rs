use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

/// INI-style configuration file: `key = value` pairs, optionally grouped
/// under `[section]` headers. Lines starting with `#` are comments.
#[derive(Debug)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Error reading file {path}: {e}"))?;
        Ok(Self::parse(&content))
    }

    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut globals = HashMap::new();
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = &line[1..line.len() - 1];
                current_section = Some(name.to_string());
                continue;
            }

            if let Some(pos) = line.find('=') {
                let key = line[..pos].trim().to_string();
                let value = line[pos + 1..].trim().trim_matches('"').to_string();

                match &current_section {
                    None => {
                        globals.insert(key, value);
                    }
                    Some(sec) => {
                        sections.entry(sec.clone()).or_default().insert(key, value);
                    }
                }
            }
        }
        Config { globals, sections }
    }

    pub fn empty() -> Self {
        Self {
            globals: HashMap::new(),
            sections: HashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_or_default<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key)
            .or_else(|| self.get_global(key))
            .unwrap_or(default)
    }

    #[must_use]
    pub fn get_non_empty_or_default<'a>(
        &'a self,
        section: &str,
        key: &str,
        default: &'a str,
    ) -> &'a str {
        self.get_non_empty(section, key)
            .or_else(|| self.get_global(key).filter(|s| !s.is_empty()))
            .unwrap_or(default)
    }
}

/// Typed engine configuration, resolved from a [`Config`] once at startup.
///
/// Every timer and threshold the engine uses lives here so tests can shrink
/// them without touching protocol code.
#[derive(Debug, Clone)]
pub struct RtcConfig {
    /// Local bind address for the bundle socket ("0.0.0.0:0" picks any port).
    pub bind_addr: String,
    /// Optional STUN server for server-reflexive candidate gathering.
    pub stun_server: Option<SocketAddr>,
    /// Interval between scheduled ICE connectivity checks.
    pub ice_check_pacing: Duration,
    /// Retransmission timeout for the first STUN transaction attempt.
    pub ice_initial_rto: Duration,
    /// Retransmits per STUN transaction before the pair is marked failed.
    pub ice_max_retransmits: u32,
    /// Overall deadline for connectivity establishment.
    pub ice_connect_timeout: Duration,
    /// Interval between keepalive checks on the selected pair.
    pub ice_keepalive_interval: Duration,
    /// Consecutive unanswered keepalives before the agent reports Disconnected.
    pub ice_keepalive_budget: u32,
    /// Base interval before the first DTLS flight retransmission.
    pub dtls_retransmit_base: Duration,
    /// Retransmissions of a DTLS flight before the handshake fails.
    pub dtls_max_retransmits: u32,
    /// Sustained SRTP auth failures before the session is torn down.
    pub srtp_auth_failure_threshold: u32,
}

impl RtcConfig {
    /// Resolves the engine configuration from an `[Rtc]` section.
    ///
    /// Unknown or malformed values fall back to the defaults.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let ms = |key: &str, fallback: Duration| -> Duration {
            config
                .get_non_empty("Rtc", key)
                .and_then(|v| v.parse::<u64>().ok())
                .map_or(fallback, Duration::from_millis)
        };
        let num = |key: &str, fallback: u32| -> u32 {
            config
                .get_non_empty("Rtc", key)
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(fallback)
        };

        Self {
            bind_addr: config
                .get_non_empty_or_default("Rtc", "bind_addr", &defaults.bind_addr)
                .to_string(),
            stun_server: config
                .get_non_empty("Rtc", "stun_server")
                .and_then(|v| v.parse().ok()),
            ice_check_pacing: ms("ice_check_pacing_ms", defaults.ice_check_pacing),
            ice_initial_rto: ms("ice_initial_rto_ms", defaults.ice_initial_rto),
            ice_max_retransmits: num("ice_max_retransmits", defaults.ice_max_retransmits),
            ice_connect_timeout: ms("ice_connect_timeout_ms", defaults.ice_connect_timeout),
            ice_keepalive_interval: ms(
                "ice_keepalive_interval_ms",
                defaults.ice_keepalive_interval,
            ),
            ice_keepalive_budget: num("ice_keepalive_budget", defaults.ice_keepalive_budget),
            dtls_retransmit_base: ms("dtls_retransmit_base_ms", defaults.dtls_retransmit_base),
            dtls_max_retransmits: num("dtls_max_retransmits", defaults.dtls_max_retransmits),
            srtp_auth_failure_threshold: num(
                "srtp_auth_failure_threshold",
                defaults.srtp_auth_failure_threshold,
            ),
        }
    }
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".to_string(),
            stun_server: None,
            ice_check_pacing: Duration::from_millis(50),
            ice_initial_rto: Duration::from_millis(500),
            ice_max_retransmits: 7,
            ice_connect_timeout: Duration::from_secs(15),
            ice_keepalive_interval: Duration::from_secs(2),
            ice_keepalive_budget: 5,
            dtls_retransmit_base: Duration::from_millis(400),
            dtls_max_retransmits: 6,
            srtp_auth_failure_threshold: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_parse_sections_and_globals_ok() {
        let cfg = Config::parse("global_key = 1\n[Rtc]\nbind_addr = \"127.0.0.1:0\"\n# comment\n");
        assert_eq!(cfg.get_global("global_key"), Some("1"));
        assert_eq!(cfg.get("Rtc", "bind_addr"), Some("127.0.0.1:0"));
        assert_eq!(cfg.get("Rtc", "missing"), None);
    }

    #[test]
    fn test_rtc_config_defaults_on_empty_ok() {
        let rtc = RtcConfig::from_config(&Config::empty());
        assert_eq!(rtc.bind_addr, "0.0.0.0:0");
        assert_eq!(rtc.ice_max_retransmits, 7);
        assert!(rtc.stun_server.is_none());
    }

    #[test]
    fn test_rtc_config_overrides_ok() {
        let cfg = Config::parse(
            "[Rtc]\nice_check_pacing_ms = 20\ndtls_max_retransmits = 3\nstun_server = 1.2.3.4:3478\n",
        );
        let rtc = RtcConfig::from_config(&cfg);
        assert_eq!(rtc.ice_check_pacing, Duration::from_millis(20));
        assert_eq!(rtc.dtls_max_retransmits, 3);
        assert_eq!(rtc.stun_server, Some("1.2.3.4:3478".parse().unwrap()));
    }

    #[test]
    fn test_rtc_config_malformed_value_falls_back_ok() {
        let cfg = Config::parse("[Rtc]\nice_max_retransmits = banana\n");
        let rtc = RtcConfig::from_config(&cfg);
        assert_eq!(rtc.ice_max_retransmits, 7);
    }
}
