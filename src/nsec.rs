//! Building the NSEC chain of a zone.

use bytes::Bytes;
use domain::base::iana::{Class, Rtype};
use domain::base::{Record, Ttl};
use domain::rdata::dnssec::RtypeBitmap;
use domain::rdata::{Nsec, ZoneRecordData};
use octseq::builder::with_infallible;

use crate::error::{Error, Result};
use crate::zone::{StoredName, StoredRecord, Zone};

/// The owner names of a zone in canonical order, linked into a cycle.
///
/// The chain is taken from the zone before it is signed. Signing only adds
/// records at names already present, so positions in the chain line up with
/// positions in a walk over the zone's nodes.
#[derive(Clone, Debug)]
pub struct NsecChain {
    apex: StoredName,
    names: Vec<StoredName>,
}

impl NsecChain {
    /// Collect the owner names of `zone`.
    ///
    /// Fails for a zone without any records.
    pub fn new(zone: &Zone) -> Result<Self> {
        if zone.is_empty() {
            return Err(Error::from(format!(
                "cannot build an NSEC chain for empty zone {}",
                zone.apex()
            )));
        }
        Ok(Self {
            apex: zone.apex().clone(),
            names: zone.names().cloned().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[StoredName] {
        &self.names
    }

    /// Whether the zone has no names besides its apex.
    pub fn is_apex_only(&self) -> bool {
        self.names.len() == 1 && self.names[0] == self.apex
    }

    /// The name following the name at `pos`, wrapping around at the end.
    pub fn next_name(&self, pos: usize) -> &StoredName {
        &self.names[(pos + 1) % self.names.len()]
    }

    /// The NSEC record for the name at `pos`.
    ///
    /// The type bitmap holds `types` plus NSEC and RRSIG, and at the apex
    /// also SOA and NS.
    pub fn nsec(&self, pos: usize, types: impl IntoIterator<Item = Rtype>, ttl: Ttl) -> StoredRecord {
        let owner = &self.names[pos];
        let mut bitmap = RtypeBitmap::<Bytes>::builder();
        let mut extra = vec![Rtype::NSEC, Rtype::RRSIG];
        if *owner == self.apex {
            extra.extend([Rtype::SOA, Rtype::NS]);
        }
        for rtype in types.into_iter().chain(extra) {
            with_infallible(|| bitmap.add(rtype));
        }
        Record::new(
            owner.clone(),
            Class::IN,
            ttl,
            ZoneRecordData::Nsec(Nsec::new(self.next_name(pos).clone(), bitmap.finalize())),
        )
    }
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::zone::tests::{a_record, name, ns_record, soa_record};

    fn zone() -> Zone {
        let mut zone = Zone::new(name("example.com."));
        zone.insert(soa_record("example.com.", 1800)).unwrap();
        zone.insert(ns_record("example.com.", "ns1.example.com."))
            .unwrap();
        zone.insert(a_record("ns1.example.com.", "192.0.2.53"))
            .unwrap();
        zone.insert(a_record("www.example.com.", "192.0.2.10"))
            .unwrap();
        zone.insert(a_record("a.b.example.com.", "192.0.2.99"))
            .unwrap();
        zone
    }

    fn types(record: &StoredRecord) -> Vec<Rtype> {
        let ZoneRecordData::Nsec(nsec) = record.data() else {
            panic!("not an NSEC");
        };
        nsec.types().iter().collect()
    }

    fn next(record: &StoredRecord) -> StoredName {
        let ZoneRecordData::Nsec(nsec) = record.data() else {
            panic!("not an NSEC");
        };
        nsec.next_name().clone()
    }

    #[test]
    fn chain_is_a_single_cycle() {
        let zone = zone();
        let chain = NsecChain::new(&zone).unwrap();
        assert_eq!(chain.len(), 4);
        assert!(!chain.is_apex_only());

        let mut seen = HashSet::new();
        let mut pos = 0;
        for _ in 0..chain.len() {
            assert!(seen.insert(chain.names()[pos].clone()));
            let next = chain.next_name(pos);
            pos = chain.names().iter().position(|n| n == next).unwrap();
        }
        assert_eq!(pos, 0);
        assert_eq!(seen.len(), chain.len());
        assert_eq!(chain.next_name(3), &name("example.com."));
    }

    #[test]
    fn nsec_bitmaps() {
        let zone = zone();
        let chain = NsecChain::new(&zone).unwrap();
        let ttl = Ttl::from_secs(1800);

        let apex = chain.nsec(0, [], ttl);
        assert_eq!(apex.owner(), &name("example.com."));
        assert_eq!(apex.ttl(), ttl);
        assert_eq!(next(&apex), name("a.b.example.com."));
        assert_eq!(
            types(&apex),
            [Rtype::NS, Rtype::SOA, Rtype::RRSIG, Rtype::NSEC]
        );

        let www = chain.nsec(3, zone.types_at(&name("www.example.com.")), ttl);
        assert_eq!(next(&www), name("example.com."));
        assert_eq!(types(&www), [Rtype::A, Rtype::RRSIG, Rtype::NSEC]);
    }

    #[test]
    fn apex_only_points_to_itself() {
        let mut zone = Zone::new(name("example.com."));
        zone.insert(soa_record("example.com.", 1800)).unwrap();
        let chain = NsecChain::new(&zone).unwrap();
        assert!(chain.is_apex_only());
        let nsec = chain.nsec(0, zone.types_at(zone.apex()), Ttl::from_secs(1800));
        assert_eq!(next(&nsec), name("example.com."));
    }

    #[test]
    fn empty_zone_is_rejected() {
        assert!(NsecChain::new(&Zone::new(name("example.com."))).is_err());
    }
}
