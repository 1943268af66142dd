use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .scriptdeckrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(|l| l.ok()) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self {
            inner: map,
            config_path,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    /// Programmatic override, used by CLI flags and tests.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn script_root(&self) -> PathBuf {
        PathBuf::from(self.get("SCRIPT_ROOT").unwrap_or_else(|| "scripts".into()))
    }

    pub fn pwsh_bin(&self) -> String {
        self.get("PWSH_BIN").unwrap_or_else(|| "pwsh".into())
    }

    pub fn custom_output_prefix(&self) -> String {
        self.get("CUSTOM_OUTPUT_PREFIX")
            .unwrap_or_else(|| "#!".into())
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.get("ERROR_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("scriptdeck").join("error.log"))
    }

    pub fn cancel_poll(&self) -> Duration {
        let ms = self
            .get("CANCEL_POLL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(250);
        Duration::from_millis(ms)
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "SCRIPT_ROOT",
        "PWSH_BIN",
        "CUSTOM_OUTPUT_PREFIX",
        "ERROR_LOG_PATH",
        "CANCEL_POLL_MS",
    ];

    KEYS.contains(&k) || k.starts_with("SCRIPTDECK_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("scriptdeck").join(".scriptdeckrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    m.insert("SCRIPT_ROOT".into(), "scripts".into());
    m.insert("PWSH_BIN".into(), "pwsh".into());
    m.insert("CUSTOM_OUTPUT_PREFIX".into(), "#!".into());
    m.insert(
        "ERROR_LOG_PATH".into(),
        env::temp_dir()
            .join("scriptdeck")
            .join("error.log")
            .to_string_lossy()
            .into_owned(),
    );
    m.insert("CANCEL_POLL_MS".into(), "250".into());

    m
}
