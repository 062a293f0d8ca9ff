//! Deciding whether a signed zone needs to be signed again.

use std::io;

use chrono::{DateTime, TimeDelta, Utc};
use domain::base::iana::Rtype;
use domain::rdata::dnssec::Timestamp;
use domain::rdata::ZoneRecordData;
use domain::zonefile::inplace::{self, Entry, Zonefile};
use tracing::debug;

/// How many records are scanned for the signature over the SOA record.
///
/// Signed zones are written with the SOA signatures among the first
/// records. A file without one near the top is taken to be fresh.
pub const MAX_SCAN_RECORDS: usize = 100;

/// How far ahead of now a signature must remain valid.
pub const LOOKAHEAD: TimeDelta = TimeDelta::days(14);

/// How many lines are added to the scanned prefix at a time.
const LINES_PER_READ: usize = MAX_SCAN_RECORDS;

/// Whether the signed zone in `source` needs to be signed again at `now`.
///
/// The zone is stale if the first RRSIG over the SOA record does not cover
/// the moment [`LOOKAHEAD`] after `now`. A source that cannot be parsed is
/// stale, one without such a signature in its first [`MAX_SCAN_RECORDS`]
/// records is not.
///
/// Only as much of `source` is read as the scan needs.
pub fn needs_resign(mut source: impl io::BufRead, now: DateTime<Utc>) -> bool {
    // Timestamps are serial numbers, the truncation is intended.
    let threshold = Timestamp::from((now + LOOKAHEAD).timestamp() as u32);

    let mut prefix = Vec::new();
    loop {
        let eof = match read_lines(&mut source, &mut prefix, LINES_PER_READ) {
            Ok(eof) => eof,
            Err(err) => {
                debug!("cannot read signed zone: {err}");
                return true;
            }
        };

        match scan(&prefix, threshold) {
            Scan::Signature { valid } => return !valid,
            Scan::Exhausted => {
                debug!("no SOA signature in the first {MAX_SCAN_RECORDS} records");
                return false;
            }
            Scan::Invalid(err) if eof => {
                debug!("cannot parse signed zone: {err}");
                return true;
            }
            Scan::Incomplete if eof => {
                debug!("no SOA signature in the signed zone");
                return false;
            }
            // The prefix may end inside a multi-line entry.
            Scan::Invalid(_) | Scan::Incomplete => {}
        }
    }
}

/// Appends up to `lines` lines from `source` to `buf`.
///
/// Returns whether the end of `source` was reached.
fn read_lines(
    source: &mut impl io::BufRead,
    buf: &mut Vec<u8>,
    lines: usize,
) -> io::Result<bool> {
    for _ in 0..lines {
        if source.read_until(b'\n', buf)? == 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

//------------ Scan ----------------------------------------------------------

/// The outcome of scanning a prefix of a signed zone.
enum Scan {
    /// An SOA signature was found.
    Signature { valid: bool },

    /// [`MAX_SCAN_RECORDS`] records were scanned without finding one.
    Exhausted,

    /// The prefix ended before either happened.
    Incomplete,

    /// The prefix failed to parse.
    Invalid(inplace::Error),
}

fn scan(prefix: &[u8], threshold: Timestamp) -> Scan {
    let mut scanned = 0;
    for entry in Zonefile::from(prefix) {
        if scanned == MAX_SCAN_RECORDS {
            return Scan::Exhausted;
        }
        let record = match entry {
            Ok(Entry::Record(record)) => record,
            Ok(Entry::Include { .. }) => continue,
            Err(err) => return Scan::Invalid(err),
        };
        scanned += 1;

        let ZoneRecordData::Rrsig(rrsig) = record.data() else {
            continue;
        };
        if rrsig.type_covered() != Rtype::SOA {
            continue;
        }
        let valid = rrsig.inception() <= threshold && threshold <= rrsig.expiration();
        debug!(
            "SOA signature valid from {} to {}, needed until {threshold}: {}",
            rrsig.inception(),
            rrsig.expiration(),
            if valid { "fresh" } else { "stale" }
        );
        return Scan::Signature { valid };
    }
    if scanned == MAX_SCAN_RECORDS {
        Scan::Exhausted
    } else {
        Scan::Incomplete
    }
}

//------------ Tests ---------------------------------------------------------
