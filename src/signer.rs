//! Signing a single zone.
//!
//! A [`Signer`] owns everything needed to turn one unsigned zone file into
//! a signed one: the zone's key pairs, where the zone is read from and where
//! the signed zone goes. A signing pass always starts from the unsigned file
//! and replaces the signed file as a whole. It runs in the following steps:
//!
//! 1. Read the zone, dropping signatures and keys of earlier passes.
//! 2. Compute the signature validity window and bump the SOA serial.
//! 3. Collect the owner names for the NSEC chain.
//! 4. Publish DNSKEY, DS, CDNSKEY and CDS records for every key.
//! 5. Sign the SOA and NS RRsets. A zone with only an apex gets its NSEC
//!    record here as well.
//! 6. Walk the names in canonical order, adding the NSEC record and signing
//!    every RRset at each name.
//! 7. Write the signed zone.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use domain::base::iana::{Class, DigestAlgorithm, Rtype};
use domain::base::{Record, Serial, Ttl};
use domain::rdata::dnssec::Timestamp;
use domain::rdata::ZoneRecordData;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::keys::{key_tags, KeyPair};
use crate::log::Logger;
use crate::nsec::NsecChain;
use crate::staleness::needs_resign;
use crate::zone::{StoredName, StoredRecord, Zone};
use crate::zonefile;

//------------ SigningWindow -------------------------------------------------

/// The validity period of the signatures made in one pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SigningWindow {
    pub inception: Timestamp,
    pub expiration: Timestamp,
}

impl SigningWindow {
    /// How far inception lies before the signing time, to allow for skewed
    /// clocks.
    pub const INCEPTION_OFFSET: TimeDelta = TimeDelta::hours(3);

    /// How far expiration lies after the signing time.
    pub const VALIDITY: TimeDelta = TimeDelta::days(21);

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            inception: timestamp(now - Self::INCEPTION_OFFSET),
            expiration: timestamp(now + Self::VALIDITY),
        }
    }
}

/// Signature timestamps are serial numbers, the truncation is intended.
fn timestamp(time: DateTime<Utc>) -> Timestamp {
    Timestamp::from(time.timestamp() as u32)
}

//------------ Signer --------------------------------------------------------

pub struct Signer {
    origin: StoredName,
    keys: Vec<KeyPair>,
    zonefile: PathBuf,
    directory: PathBuf,
    signed_file: String,
    logger: Logger,

    /// Held for the duration of a signing pass.
    running: Arc<Mutex<()>>,
}

impl Signer {
    /// Create a signer for the zone `origin`.
    ///
    /// The zone is read from `zonefile` and written to `signed_file` in
    /// `directory`. There must be at least one key and all keys must belong
    /// to `origin`.
    pub fn new(
        origin: StoredName,
        keys: Vec<KeyPair>,
        zonefile: PathBuf,
        directory: PathBuf,
        signed_file: String,
        logger: Logger,
    ) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::from(format!("no keys for zone {origin}")));
        }
        if let Some(key) = keys.iter().find(|key| *key.owner() != origin) {
            return Err(Error::from(format!(
                "key {} belongs to {}, not to zone {origin}",
                key.key_tag(),
                key.owner()
            )));
        }
        Ok(Self {
            origin,
            keys,
            zonefile,
            directory,
            signed_file,
            logger,
            running: Default::default(),
        })
    }

    pub fn origin(&self) -> &StoredName {
        &self.origin
    }

    pub fn keys(&self) -> &[KeyPair] {
        &self.keys
    }

    /// Where the signed zone is written.
    pub fn signed_path(&self) -> PathBuf {
        self.directory.join(&self.signed_file)
    }

    /// Run a signing pass at `now`, returning the path of the signed zone.
    pub fn sign(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let mut zone = zonefile::read_file(&self.zonefile, &self.origin)?;
        let zone_name = self.origin.clone();

        let window = SigningWindow::at(now);
        let ttl = zone
            .soa_ttl()
            .ok_or_else(|| format!("zone {zone_name} has no SOA record"))?;
        zone.set_soa_serial(Serial(now.timestamp() as u32))?;
        debug!(
            "signing {zone_name} from {} to {} with TTL {}",
            window.inception,
            window.expiration,
            ttl.as_secs()
        );

        let chain = NsecChain::new(&zone)?;

        self.insert_keys(&mut zone, ttl)?;

        let apex = zone.apex().clone();
        if chain.is_apex_only() {
            let nsec = chain.nsec(0, zone.types_at(&apex), ttl);
            zone.insert(nsec)?;
        }

        let mut apex_types = vec![Rtype::SOA, Rtype::NS];
        if chain.is_apex_only() {
            apex_types.push(Rtype::NSEC);
        }
        for rtype in &apex_types {
            let Some(rrset) = zone.rrset(&apex, *rtype) else {
                continue;
            };
            let signatures = self.sign_rrset(rrset, ttl, window)?;
            for rrsig in signatures {
                zone.insert(rrsig)?;
            }
        }

        for (pos, (owner, node)) in zone.nodes_mut().enumerate() {
            debug_assert_eq!(owner, &chain.names()[pos]);
            let is_apex = *owner == apex;
            if !chain.is_apex_only() {
                let nsec = chain.nsec(pos, node.types(), ttl);
                node.insert(nsec);
            }

            let mut signatures = Vec::new();
            for (rtype, rrset) in node.rrsets() {
                if rtype == Rtype::RRSIG || (is_apex && apex_types.contains(&rtype)) {
                    continue;
                }
                trace!("signing {owner} {rtype}");
                signatures.extend(self.sign_rrset(rrset, ttl, window)?);
            }
            for rrsig in signatures {
                node.insert(rrsig);
            }
        }

        zonefile::write(&zone, &self.directory, &self.signed_file)
    }

    /// Publish the keys at the apex.
    ///
    /// Every key gets a DNSKEY, a SHA-1 and a SHA-256 DS, a CDNSKEY and a
    /// SHA-256 CDS record.
    fn insert_keys(&self, zone: &mut Zone, ttl: Ttl) -> Result<()> {
        let apex = zone.apex().clone();
        for key in &self.keys {
            let data = [
                ZoneRecordData::Dnskey(key.dnskey().clone()),
                ZoneRecordData::Ds(key.ds(DigestAlgorithm::SHA1)?),
                ZoneRecordData::Ds(key.ds(DigestAlgorithm::SHA256)?),
                ZoneRecordData::Cdnskey(key.cdnskey()?),
                ZoneRecordData::Cds(key.cds(DigestAlgorithm::SHA256)?),
            ];
            for data in data {
                zone.insert(Record::new(apex.clone(), Class::IN, ttl, data))?;
            }
        }
        Ok(())
    }

    /// Sign `rrset` with every key.
    fn sign_rrset(
        &self,
        rrset: &[StoredRecord],
        ttl: Ttl,
        window: SigningWindow,
    ) -> Result<Vec<StoredRecord>> {
        self.keys
            .iter()
            .map(|key| {
                key.sign(rrset, &self.origin, ttl, window.inception, window.expiration)
            })
            .collect()
    }

    /// Whether the signed zone needs to be signed again now.
    pub fn resign(&self) -> bool {
        self.resign_at(Utc::now())
    }

    /// Whether the signed zone needs to be signed again at `now`.
    ///
    /// A signed zone that does not exist or cannot be opened does.
    pub fn resign_at(&self, now: DateTime<Utc>) -> bool {
        let path = self.signed_path();
        match File::open(&path) {
            Ok(file) => needs_resign(io::BufReader::new(file), now),
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    debug!("cannot open {}: {err}", path.display());
                }
                true
            }
        }
    }

    /// Run a signing pass now and log its outcome.
    pub fn sign_and_log(&self) -> Result<PathBuf> {
        let tags = key_tags(&self.keys);
        let start = Instant::now();
        let res = self.sign(Utc::now());
        let elapsed = start.elapsed();
        match &res {
            Ok(path) => self.logger.info(format_args!(
                "Signed zone {} with keys {tags} in {elapsed:.2?}, wrote {}",
                self.origin,
                path.display()
            )),
            Err(err) => self.logger.warn(format_args!(
                "Failed to sign zone {} with keys {tags} after {elapsed:.2?}: {err}",
                self.origin
            )),
        }
        res
    }

    /// Start a signing pass in the background.
    ///
    /// If a pass for this zone is still running, no new one is started and
    /// `None` is returned.
    pub fn spawn_pass(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let Ok(guard) = self.running.clone().try_lock_owned() else {
            self.logger.warn(format_args!(
                "Skipping signing of zone {}, the previous pass is still running",
                self.origin
            ));
            return None;
        };
        let signer = self.clone();
        Some(tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let _ = signer.sign_and_log();
        }))
    }

    /// Wait until no signing pass is running.
    pub async fn idle(&self) {
        drop(self.running.lock().await);
    }

    /// Start a signing pass every `every` until `stop` fires.
    ///
    /// The first pass starts one interval from now.
    pub async fn refresh(self: Arc<Self>, every: Duration, mut stop: StopSignal) {
        let mut ticks = interval_at(tokio::time::Instant::now() + every, every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("refreshing {} every {every:?}", self.origin);
        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = ticks.tick() => {
                    self.spawn_pass();
                }
            }
        }
        debug!("stopped refreshing {}", self.origin);
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("origin", &self.origin)
            .field("keys", &self.keys)
            .field("zonefile", &self.zonefile)
            .field("signed_path", &self.signed_path())
            .finish()
    }
}

//------------ Stop signal ---------------------------------------------------

/// Create a connected stop handle and signal.
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Fires the stop signal.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Stop everybody listening. There is no way back.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// A new signal listening to this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Waits for the stop signal.
#[derive(Clone, Debug)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Resolves once stop has been fired or the handle is gone.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// The default name of the signed zone file of `origin`.
pub fn default_signed_file(origin: &StoredName) -> String {
    format!("db.{origin}.signed")
}

/// The directory a zone file lives in, for use as the default output
/// directory.
pub fn zonefile_directory(zonefile: &Path) -> PathBuf {
    match zonefile.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

//------------ Tests ---------------------------------------------------------
