//! All signers of a running `zonesign`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{Config, ZoneConfig};
use crate::env::Env;
use crate::error::{Context, Result};
use crate::keys::KeyPair;
use crate::log::Logger;
use crate::signer::{stop_signal, zonefile_directory, Signer, StopHandle};

/// A set of signers sharing one stop signal.
#[derive(Debug)]
pub struct SignerSet {
    signers: Vec<(Arc<Signer>, Duration)>,
    stop: StopHandle,
    loops: Vec<JoinHandle<()>>,
}

impl SignerSet {
    pub fn new() -> Self {
        let (stop, _) = stop_signal();
        Self {
            signers: Vec::new(),
            stop,
            loops: Vec::new(),
        }
    }

    /// Build a signer for every zone in `config`.
    pub fn from_config(config: &Config, env: &impl Env) -> Result<Self> {
        let logger = Logger::new(env);
        let mut set = Self::new();
        for zone in &config.zones {
            let signer = build_signer(zone, env, logger.clone())
                .with_context(|| format!("setting up zone {}", zone.origin))?;
            set.push(signer, zone.refresh_interval());
        }
        Ok(set)
    }

    /// Add a signer that is refreshed every `refresh`.
    pub fn push(&mut self, signer: Signer, refresh: Duration) {
        self.signers.push((Arc::new(signer), refresh));
    }

    pub fn signers(&self) -> impl Iterator<Item = &Arc<Signer>> + '_ {
        self.signers.iter().map(|(signer, _)| signer)
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// Start a signing pass for every zone whose signed zone is stale.
    ///
    /// Returns without waiting for any of the passes.
    pub fn on_startup(&self) -> Result<()> {
        let launched = self.launch_stale();
        debug!("started {} of {} signers", launched.len(), self.len());
        Ok(())
    }

    /// Start a signing pass for every zone whose signed zone is stale,
    /// returning the handles of the passes.
    pub fn launch_stale(&self) -> Vec<JoinHandle<()>> {
        self.signers()
            .filter(|signer| signer.resign())
            .filter_map(|signer| signer.spawn_pass())
            .collect()
    }

    /// Start the periodic refresh of every zone.
    pub fn start_refresh(&mut self) {
        for (signer, every) in &self.signers {
            let task = signer.clone().refresh(*every, self.stop.signal());
            self.loops.push(tokio::spawn(task));
        }
    }

    /// Stop all refresh loops. Running passes are left to finish.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Stop all refresh loops and wait for them and any running passes.
    pub async fn shutdown(mut self) {
        self.stop();
        for task in self.loops.drain(..) {
            let _ = task.await;
        }
        for signer in self.signers() {
            signer.idle().await;
        }
    }
}

impl Default for SignerSet {
    fn default() -> Self {
        Self::new()
    }
}

fn build_signer(zone: &ZoneConfig, env: &impl Env, logger: Logger) -> Result<Signer> {
    let origin = zone.origin()?;
    let keys = zone
        .keys
        .iter()
        .map(|key| KeyPair::load(env.in_cwd(key)))
        .collect::<Result<Vec<_>>>()?;
    let zonefile = env.in_cwd(&zone.zonefile).into_owned();
    let directory = match &zone.directory {
        Some(dir) => env.in_cwd(dir).into_owned(),
        None => zonefile_directory(&zonefile),
    };
    let signed_file = zone.signed_file(&origin);
    Signer::new(origin, keys, zonefile, directory, signed_file, logger)
}
