//! Configuration system.
//!
//! Loads game configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

/// Root configuration for the game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Server listen address, e.g. `127.0.0.1:4000`.
    pub listen_addr: String,
    /// Fast (physics) tick rate.
    pub tick_hz: u32,
    /// Every Nth fast tick additionally runs the slow/logic path.
    #[serde(default = "default_slow_every")]
    pub slow_every: u32,
    /// Room capacity.
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// Level loaded into new rooms.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_slow_every() -> u32 {
    20
}

fn default_max_players() -> u32 {
    4
}

fn default_level() -> String {
    "beach".to_string()
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4000".to_string(),
            tick_hz: 20,
            slow_every: default_slow_every(),
            max_players: default_max_players(),
            level: default_level(),
        }
    }
}

impl GameConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_apply() {
        let cfg = GameConfig::from_json_str(r#"{"listen_addr":"0.0.0.0:5000","tick_hz":30}"#)
            .unwrap();
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.slow_every, 20);
        assert_eq!(cfg.max_players, 4);
        assert_eq!(cfg.level, "beach");
    }
}
