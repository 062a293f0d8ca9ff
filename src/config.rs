//! The configuration of `zonesign run`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ensure, Context, Error, Result};
use crate::signer::default_signed_file;
use crate::zone::StoredName;

/// The refresh interval used when none is configured, six days.
pub const DEFAULT_REFRESH: u64 = 6 * 24 * 60 * 60;

fn default_refresh() -> u64 {
    DEFAULT_REFRESH
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub zones: Vec<ZoneConfig>,
}

/// The configuration of a single zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ZoneConfig {
    /// The zone's apex.
    pub origin: String,

    /// The unsigned zone file.
    pub zonefile: PathBuf,

    /// The key pairs, as paths without `.key` or `.private`.
    pub keys: Vec<PathBuf>,

    /// Where the signed zone goes. Defaults to the zone file's directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// The file name of the signed zone. Defaults to `db.<origin>.signed`.
    #[serde(default)]
    pub signed_file: Option<String>,

    /// Seconds between signing passes.
    #[serde(default = "default_refresh")]
    pub refresh: u64,
}

impl Config {
    /// Load and check the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| format!("unable to open file {}: {e}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("loading {}", path.display()))?;
        config
            .check()
            .with_context(|| format!("loading {}", path.display()))?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        ensure!(!self.zones.is_empty(), "no zones configured");
        for zone in &self.zones {
            let origin = zone.origin()?;
            ensure!(!zone.keys.is_empty(), "no keys for zone {origin}");
            ensure!(
                zone.refresh != 0,
                "refresh interval for zone {origin} must not be zero"
            );
            if let Some(name) = &zone.signed_file {
                ensure!(
                    !name.is_empty() && !name.contains('/'),
                    "invalid signed-file '{name}' for zone {origin}"
                );
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.check()?;
        Ok(config)
    }
}

impl ZoneConfig {
    pub fn origin(&self) -> Result<StoredName> {
        StoredName::from_str(&self.origin)
            .map_err(|err| format!("invalid origin '{}': {err}", self.origin).into())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh)
    }

    /// The file name of the signed zone, `origin` being the zone's apex.
    pub fn signed_file(&self, origin: &StoredName) -> String {
        self.signed_file
            .clone()
            .unwrap_or_else(|| default_signed_file(origin))
    }
}
