use std::io::Read;
use std::path::PathBuf;

use twenty48_core::engine::{MAX_EXPONENT, Tile, WINNING_TILE};

use crate::history::ScoreHistory;
use crate::session::Session;

#[derive(Clone, Debug, PartialEq, serde::Deserialize, Default)]
pub struct Config {
    /// Tile value that raises the win prompt. Falls back to 2048 when
    /// missing or not a power of two in 4..=32768.
    #[serde(default)]
    pub winning_tile: Option<Tile>,

    /// Seed for tile spawning; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct History {
    /// JSON file holding the local top-N list; in-memory when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "defaults::history_capacity")]
    pub capacity: usize,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, Default)]
pub struct Store {
    /// SQLite database for submitted scores; submission is disabled when absent.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Default for History {
    fn default() -> Self {
        Self {
            path: None,
            capacity: defaults::history_capacity(),
        }
    }
}

impl Config {
    pub fn from_toml<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut file = std::fs::File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let cfg: Self = toml::from_str(&contents)?;
        Ok(cfg)
    }

    /// Resolve the winning tile to 2048 unless a sane power of two is set.
    pub fn winning_tile_or_default(&self) -> Tile {
        match self.winning_tile {
            Some(t) if t.is_power_of_two() && t >= 4 && t <= 1 << MAX_EXPONENT => t,
            _ => WINNING_TILE,
        }
    }

    /// Open the configured history, or an in-memory one.
    pub fn load_history(&self) -> ScoreHistory {
        let capacity = self.history.capacity_or_default();
        match &self.history.path {
            Some(path) => ScoreHistory::load(path, capacity),
            None => ScoreHistory::in_memory(capacity),
        }
    }
}

impl History {
    /// Capacity clamped to [1, 100]; 10 when unset.
    pub fn capacity_or_default(&self) -> usize {
        self.capacity.clamp(1, 100)
    }
}

impl SessionConfig {
    /// A signed-in session when both id and name are set, a guest otherwise.
    pub fn session(&self) -> Session {
        match (&self.user_id, &self.username) {
            (Some(id), Some(name)) => Session::signed_in(id.clone(), name.clone()),
            _ => Session::Guest,
        }
    }
}

mod defaults {
    pub fn history_capacity() -> usize { 10 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_full_config() {
        let td = tempdir().unwrap();
        let path = td.path().join("play.toml");
        std::fs::write(
            &path,
            r#"
            winning_tile = 1024
            seed = 42

            [history]
            path = "history.json"
            capacity = 5

            [store]
            db_path = "scores.db"

            [session]
            user_id = "u-1"
            username = "alice"
            "#,
        )
        .unwrap();
        let cfg = Config::from_toml(&path).unwrap();
        assert_eq!(cfg.winning_tile_or_default(), 1024);
        assert_eq!(cfg.seed, Some(42));
        assert_eq!(cfg.history.capacity_or_default(), 5);
        assert_eq!(cfg.store.db_path, Some(PathBuf::from("scores.db")));
        assert_eq!(cfg.session.session(), Session::signed_in("u-1", "alice"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.winning_tile_or_default(), 2048);
        assert_eq!(cfg.history.capacity_or_default(), 10);
        assert!(cfg.store.db_path.is_none());
        assert_eq!(cfg.session.session(), Session::Guest);
    }

    #[test]
    fn bogus_values_fall_back() {
        let cfg: Config = toml::from_str("winning_tile = 1000\n[history]\ncapacity = 0").unwrap();
        assert_eq!(cfg.winning_tile_or_default(), 2048);
        assert_eq!(cfg.history.capacity_or_default(), 1);
        let half: Config = toml::from_str("[session]\nuser_id = \"u-9\"").unwrap();
        assert_eq!(half.session.session(), Session::Guest);
    }

    #[test]
    fn missing_file_is_an_error() {
        let td = tempdir().unwrap();
        assert!(Config::from_toml(td.path().join("nope.toml")).is_err());
    }
}
