//! An in-memory zone.
//!
//! A [`Zone`] keeps its records per owner name, ordered by the canonical DNS
//! name order of RFC 4034, section 6.1. Each owner name maps to a [`Node`]
//! holding one RRset per record type. Signatures are kept as a single RRSIG
//! RRset per node, whatever type they cover.

use std::collections::BTreeMap;

use bytes::Bytes;
use domain::base::iana::Rtype;
use domain::base::{Name, Record, Serial, Ttl};
use domain::rdata::{Soa, ZoneRecordData};

use crate::error::{Error, Result};

pub type StoredName = Name<Bytes>;
pub type StoredRecordData = ZoneRecordData<Bytes, StoredName>;
pub type StoredRecord = Record<StoredName, StoredRecordData>;

//------------ Zone ----------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Zone {
    apex: StoredName,
    nodes: BTreeMap<StoredName, Node>,
}

impl Zone {
    pub fn new(apex: StoredName) -> Self {
        Self {
            apex,
            nodes: BTreeMap::new(),
        }
    }

    pub fn apex(&self) -> &StoredName {
        &self.apex
    }

    /// The number of owner names in the zone.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a record to the zone.
    ///
    /// Records outside of the apex and SOA records anywhere but at the apex
    /// are rejected, as is a second SOA record. Adding a record that is
    /// already present does nothing.
    pub fn insert(&mut self, record: StoredRecord) -> Result<()> {
        if !record.owner().ends_with(&self.apex) {
            return Err(Error::from(format!(
                "out of zone data: {} is not below {}",
                record.owner(),
                self.apex
            )));
        }
        if record.rtype() == Rtype::SOA {
            if *record.owner() != self.apex {
                return Err(Error::from(format!(
                    "SOA record for {} is not at the zone apex {}",
                    record.owner(),
                    self.apex
                )));
            }
            if self.soa().is_some() {
                return Err(Error::from(format!(
                    "multiple SOA records for {}",
                    self.apex
                )));
            }
        }
        self.nodes
            .entry(record.owner().clone())
            .or_default()
            .insert(record);
        Ok(())
    }

    pub fn soa(&self) -> Option<&StoredRecord> {
        self.rrset(&self.apex, Rtype::SOA)?.first()
    }

    pub fn soa_ttl(&self) -> Option<Ttl> {
        self.soa().map(|soa| soa.ttl())
    }

    /// Replace the serial of the SOA record.
    pub fn set_soa_serial(&mut self, serial: Serial) -> Result<()> {
        let record = self
            .nodes
            .get_mut(&self.apex)
            .and_then(|node| node.rrsets.get_mut(&Rtype::SOA))
            .and_then(|rrset| rrset.first_mut())
            .ok_or_else(|| Error::from(format!("zone {} has no SOA record", self.apex)))?;
        let ZoneRecordData::Soa(soa) = record.data() else {
            return Err(Error::from("SOA RRset holds non-SOA data"));
        };
        let soa = Soa::new(
            soa.mname().clone(),
            soa.rname().clone(),
            serial,
            soa.refresh(),
            soa.retry(),
            soa.expire(),
            soa.minimum(),
        );
        *record.data_mut() = ZoneRecordData::Soa(soa);
        Ok(())
    }

    pub fn node(&self, owner: &StoredName) -> Option<&Node> {
        self.nodes.get(owner)
    }

    pub fn rrset(&self, owner: &StoredName, rtype: Rtype) -> Option<&[StoredRecord]> {
        self.node(owner)?.rrset(rtype)
    }

    /// The record types present at `owner`, in ascending order.
    pub fn types_at(&self, owner: &StoredName) -> Vec<Rtype> {
        self.node(owner)
            .map(|node| node.types().collect())
            .unwrap_or_default()
    }

    /// The owner names in canonical order.
    pub fn names(&self) -> impl Iterator<Item = &StoredName> + '_ {
        self.nodes.keys()
    }

    /// The nodes in canonical order.
    pub fn nodes(&self) -> impl Iterator<Item = (&StoredName, &Node)> + '_ {
        self.nodes.iter()
    }

    /// The nodes in canonical order, for in-place changes.
    ///
    /// The set of owner names cannot change during the walk.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = (&StoredName, &mut Node)> + '_ {
        self.nodes.iter_mut()
    }

    /// All records, node by node in canonical order.
    pub fn records(&self) -> impl Iterator<Item = &StoredRecord> + '_ {
        self.nodes.values().flat_map(|node| node.records())
    }
}

//------------ Node ----------------------------------------------------------

/// The RRsets at one owner name.
#[derive(Clone, Debug, Default)]
pub struct Node {
    rrsets: BTreeMap<Rtype, Vec<StoredRecord>>,
}

impl Node {
    /// Add a record, returning whether it was new.
    pub fn insert(&mut self, record: StoredRecord) -> bool {
        let rrset = self.rrsets.entry(record.rtype()).or_default();
        if rrset.contains(&record) {
            return false;
        }
        rrset.push(record);
        true
    }

    pub fn rrset(&self, rtype: Rtype) -> Option<&[StoredRecord]> {
        self.rrsets.get(&rtype).map(Vec::as_slice)
    }

    pub fn rrsets(&self) -> impl Iterator<Item = (Rtype, &[StoredRecord])> + '_ {
        self.rrsets
            .iter()
            .map(|(rtype, rrset)| (*rtype, rrset.as_slice()))
    }

    pub fn types(&self) -> impl Iterator<Item = Rtype> + '_ {
        self.rrsets.keys().copied()
    }

    pub fn records(&self) -> impl Iterator<Item = &StoredRecord> + '_ {
        self.rrsets.values().flatten()
    }
}

//------------ Tests ---------------------------------------------------------
