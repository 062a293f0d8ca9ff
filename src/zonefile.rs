//! Reading and writing zones in the textual zone file format.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use domain::base::iana::Rtype;
use domain::base::name::FlattenInto;
use domain::base::zonefile_fmt::{DisplayKind, ZonefileFmt};
use domain::rdata::ZoneRecordData;
use domain::zonefile::inplace::{Entry, Zonefile};
use tracing::{debug, trace};

use crate::error::{Context, Error, Result};
use crate::zone::{Node, StoredName, StoredRecord, Zone};

/// How deep `$INCLUDE` directives may nest.
const MAX_INCLUDE_DEPTH: usize = 7;

/// Record types produced by signing, discarded when a zone is read.
const SIGNING_TYPES: [Rtype; 4] = [Rtype::RRSIG, Rtype::DNSKEY, Rtype::CDNSKEY, Rtype::CDS];

//------------ Reading -------------------------------------------------------

/// Read a zone from `source`.
///
/// `label` names the source in error messages. RRSIG, DNSKEY, CDNSKEY and
/// CDS records are dropped. Relative `$INCLUDE` paths are taken relative to
/// the current directory.
pub fn read(source: impl io::Read, origin: &StoredName, label: &str) -> Result<Zone> {
    let mut reader = Reader::new(origin);
    reader.read(source, label, Path::new(""), 0)?;
    reader.finish(label)
}

/// Read a zone from the file at `path`.
///
/// Relative `$INCLUDE` paths are taken relative to the directory of `path`.
pub fn read_file(path: &Path, origin: &StoredName) -> Result<Zone> {
    let label = path.display().to_string();
    let file = File::open(path).with_context(|| format!("opening zone file {label}"))?;
    let mut reader = Reader::new(origin);
    reader.read(file, &label, path.parent().unwrap_or(Path::new("")), 0)?;
    reader.finish(&label)
}

struct Reader {
    zone: Zone,
    soa_seen: bool,
}

impl Reader {
    fn new(origin: &StoredName) -> Self {
        Self {
            zone: Zone::new(origin.clone()),
            soa_seen: false,
        }
    }

    fn read(
        &mut self,
        mut source: impl io::Read,
        label: &str,
        base: &Path,
        depth: usize,
    ) -> Result<()> {
        let mut zonefile =
            Zonefile::load(&mut source).with_context(|| format!("reading {label}"))?;
        zonefile.set_origin(self.zone.apex().clone());

        for entry in zonefile {
            let entry = entry.map_err(|err| format!("{label}: invalid zone file: {err}"))?;
            match entry {
                Entry::Record(record) => {
                    let record: StoredRecord = record.flatten_into();
                    if SIGNING_TYPES.contains(&record.rtype()) {
                        trace!("{label}: dropping {} record at {}", record.rtype(), record.owner());
                        continue;
                    }
                    if record.rtype() == Rtype::SOA {
                        self.soa_seen = true;
                    }
                    self.zone
                        .insert(record)
                        .with_context(|| format!("reading {label}"))?;
                }
                Entry::Include { path, origin } => {
                    if origin.is_some() {
                        return Err(Error::from(format!(
                            "{label}: $INCLUDE with an origin is not supported"
                        )));
                    }
                    if depth >= MAX_INCLUDE_DEPTH {
                        return Err(Error::from(format!(
                            "{label}: $INCLUDE nested too deeply"
                        )));
                    }
                    let path = base.join(path.to_string());
                    let included = path.display().to_string();
                    debug!("{label}: including {included}");
                    let file = File::open(&path)
                        .with_context(|| format!("opening included file {included}"))?;
                    self.read(
                        file,
                        &included,
                        path.parent().unwrap_or(Path::new("")),
                        depth + 1,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn finish(self, label: &str) -> Result<Zone> {
        if !self.soa_seen {
            return Err(Error::from(format!("{label}: zone has no SOA record")));
        }
        Ok(self.zone)
    }
}

//------------ Writing -------------------------------------------------------

/// Write the records of `zone` to `target`.
///
/// The SOA record and its signatures come first, followed by the apex NS
/// records and their signatures. Then every owner name follows in canonical
/// order, each RRset directly followed by the signatures covering it.
pub fn write_records(zone: &Zone, mut target: impl Write) -> Result<()> {
    let apex = zone.apex();
    let apex_node = zone.node(apex);

    for rtype in [Rtype::SOA, Rtype::NS] {
        if let Some(node) = apex_node {
            write_rrset(node, rtype, &mut target)?;
        }
    }

    for (owner, node) in zone.nodes() {
        for rtype in node.types() {
            if rtype == Rtype::RRSIG || (owner == apex && matches!(rtype, Rtype::SOA | Rtype::NS))
            {
                continue;
            }
            write_rrset(node, rtype, &mut target)?;
        }

        // Signatures over types that are not present at the name.
        for record in node.rrset(Rtype::RRSIG).unwrap_or_default() {
            if let ZoneRecordData::Rrsig(rrsig) = record.data() {
                if node.rrset(rrsig.type_covered()).is_none() {
                    write_record(record, &mut target)?;
                }
            }
        }
    }
    Ok(())
}

/// Write the `rtype` RRset of `node` and the RRSIG records covering it.
fn write_rrset(node: &Node, rtype: Rtype, target: &mut impl Write) -> Result<()> {
    for record in node.rrset(rtype).unwrap_or_default() {
        write_record(record, target)?;
    }
    for record in covering(node, rtype) {
        write_record(record, target)?;
    }
    Ok(())
}

fn write_record(record: &StoredRecord, target: &mut impl Write) -> io::Result<()> {
    writeln!(target, "{}", record.display_zonefile(DisplayKind::Simple))
}

/// The RRSIG records at `node` covering `rtype`.
fn covering(node: &Node, rtype: Rtype) -> impl Iterator<Item = &StoredRecord> + '_ {
    node.rrset(Rtype::RRSIG)
        .unwrap_or_default()
        .iter()
        .filter(move |record| {
            matches!(record.data(), ZoneRecordData::Rrsig(rrsig) if rrsig.type_covered() == rtype)
        })
}

/// Write `zone` to `directory/name`, replacing any previous file.
///
/// The records go to a temporary file in `directory` first which is renamed
/// to its final name once complete. Returns the final path.
pub fn write(zone: &Zone, directory: &Path, name: &str) -> Result<PathBuf> {
    let path = directory.join(name);
    let mut tmp = tempfile::Builder::new()
        .prefix("signed-")
        .tempfile_in(directory)
        .with_context(|| format!("creating temporary file in {}", directory.display()))?;

    let tmp_path = tmp.path().to_path_buf();
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write_records(zone, &mut writer)
            .and_then(|()| writer.flush().map_err(Error::from))
            .with_context(|| format!("writing {}", tmp_path.display()))?;
    }
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("writing {}", tmp_path.display()))?;

    tmp.persist(&path)
        .map_err(|err| err.error)
        .with_context(|| format!("renaming to {}", path.display()))?;
    debug!("wrote {}", path.display());
    Ok(path)
}

//------------ Tests ---------------------------------------------------------
