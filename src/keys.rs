//! Signing key pairs.
//!
//! A [`KeyPair`] binds the DNSKEY of a zone key to the private key that
//! computes its signatures. Keys are loaded from the conventional BIND file
//! pair `K<name>+<alg>+<tag>.key` and `K<name>+<alg>+<tag>.private`.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;

use bytes::Bytes;
use domain::base::iana::{DigestAlgorithm, SecurityAlgorithm};
use domain::base::{Record, Ttl};
use domain::crypto::sign::{KeyPair as SecretKey, SecretKeyBytes};
use domain::dnssec::common::parse_from_bind;
use domain::dnssec::sign::keys::SigningKey;
use domain::dnssec::sign::records::Rrset;
use domain::dnssec::sign::signatures::rrsigs::sign_rrset;
use domain::dnssec::validator::base::DnskeyExt;
use domain::rdata::dnssec::Timestamp;
use domain::rdata::{Cdnskey, Cds, Dnskey, Ds, ZoneRecordData};

use crate::error::{ensure, Context, Error, Result};
use crate::zone::{StoredName, StoredRecord};

//------------ KeyPair -------------------------------------------------------

/// A DNSSEC key pair for a single algorithm.
pub struct KeyPair {
    dnskey: Dnskey<Bytes>,
    key_tag: u16,
    key: SigningKey<Bytes, SecretKey>,
}

impl KeyPair {
    /// Combine a DNSKEY with its private key.
    ///
    /// The private key must match the public key.
    pub fn new(owner: StoredName, dnskey: Dnskey<Bytes>, secret: &SecretKeyBytes) -> Result<Self> {
        let key_pair = SecretKey::from_bytes(secret, &dnskey)
            .map_err(|err| format!("private and public key do not match: {err}"))?;
        let key_tag = dnskey.key_tag();
        let key = SigningKey::new(owner, dnskey.flags(), key_pair);
        Ok(Self {
            dnskey,
            key_tag,
            key,
        })
    }

    /// Load a key pair from BIND style key files.
    ///
    /// `base` is the path without the `.key` or `.private` extension.
    pub fn load(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let public_path = with_extension(base, ".key");
        let private_path = with_extension(base, ".private");

        let public_key = std::fs::read_to_string(&public_path)
            .map_err(Error::from)
            .and_then(|data| {
                parse_from_bind::<Bytes>(&data)
                    .map_err(|err| format!("invalid public key file: {err}").into())
            })
            .with_context(|| format!("loading public key {}", Path::new(&public_path).display()))?;
        let secret = std::fs::read_to_string(&private_path)
            .map_err(Error::from)
            .and_then(|data| {
                SecretKeyBytes::parse_from_bind(&data)
                    .map_err(|err| format!("invalid private key file: {err}").into())
            })
            .with_context(|| {
                format!("loading private key {}", Path::new(&private_path).display())
            })?;

        Self::new(
            public_key.owner().clone(),
            public_key.data().clone(),
            &secret,
        )
        .with_context(|| format!("loading key pair {}", base.display()))
    }

    pub fn owner(&self) -> &StoredName {
        self.key.owner()
    }

    pub fn algorithm(&self) -> SecurityAlgorithm {
        self.dnskey.algorithm()
    }

    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    pub fn dnskey(&self) -> &Dnskey<Bytes> {
        &self.dnskey
    }

    /// The DS record data for this key using the given digest.
    pub fn ds(&self, digest_type: DigestAlgorithm) -> Result<Ds<Bytes>> {
        let digest = self.digest(digest_type)?;
        Ds::new(self.key_tag, self.algorithm(), digest_type, digest)
            .map_err(|err| format!("cannot create DS record: {err}").into())
    }

    /// The CDS record data for this key using the given digest.
    pub fn cds(&self, digest_type: DigestAlgorithm) -> Result<Cds<Bytes>> {
        let digest = self.digest(digest_type)?;
        Cds::new(self.key_tag, self.algorithm(), digest_type, digest)
            .map_err(|err| format!("cannot create CDS record: {err}").into())
    }

    /// The CDNSKEY record data mirroring the DNSKEY.
    pub fn cdnskey(&self) -> Result<Cdnskey<Bytes>> {
        Cdnskey::new(
            self.dnskey.flags(),
            self.dnskey.protocol(),
            self.dnskey.algorithm(),
            self.dnskey.public_key().clone(),
        )
        .map_err(|err| format!("cannot create CDNSKEY record: {err}").into())
    }

    fn digest(&self, digest_type: DigestAlgorithm) -> Result<Bytes> {
        let digest = self
            .dnskey
            .digest(self.owner(), digest_type)
            .map_err(|err| format!("cannot digest key {}: {err}", self.key_tag))?;
        Ok(Bytes::copy_from_slice(digest.as_ref()))
    }

    /// Sign an RRset.
    ///
    /// All records in `rrset` must share owner, class and type. The RRSIG
    /// uses `ttl` both as its own TTL and as the original TTL of the
    /// signed records. `signer_name` must be the owner of the key.
    pub fn sign(
        &self,
        rrset: &[StoredRecord],
        signer_name: &StoredName,
        ttl: Ttl,
        inception: Timestamp,
        expiration: Timestamp,
    ) -> Result<StoredRecord> {
        ensure!(
            signer_name == self.owner(),
            "key {} belongs to {}, not to {signer_name}",
            self.key_tag,
            self.owner()
        );
        let Some(first) = rrset.first() else {
            return Err("cannot sign an empty RRset".into());
        };
        let (owner, class, rtype) = (first.owner(), first.class(), first.rtype());
        if rrset
            .iter()
            .any(|rr| rr.rtype() != rtype || rr.class() != class || rr.owner() != owner)
        {
            return Err(format!("mixed RRset at {owner} {rtype}").into());
        }

        let records: Vec<StoredRecord> = rrset
            .iter()
            .map(|rr| Record::new(rr.owner().clone(), class, ttl, rr.data().clone()))
            .collect();
        let rrset = Rrset::new_from_owned(&records)
            .map_err(|err| format!("cannot sign {owner} {rtype}: {err}"))?;
        let rrsig = sign_rrset(&self.key, &rrset, inception, expiration).map_err(|err| {
            format!("signing {owner} {rtype} with key {}: {err}", self.key_tag)
        })?;

        Ok(Record::new(
            rrsig.owner().clone(),
            rrsig.class(),
            rrsig.ttl(),
            ZoneRecordData::Rrsig(rrsig.data().clone()),
        ))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("owner", self.owner())
            .field("algorithm", &self.algorithm())
            .field("key_tag", &self.key_tag)
            .finish_non_exhaustive()
    }
}

//------------ Key tags ------------------------------------------------------

/// The key tags of `keys`, separated by commas.
pub fn key_tags(keys: &[KeyPair]) -> String {
    keys.iter()
        .map(|key| key.key_tag().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

//------------ Helpers -------------------------------------------------------

fn with_extension(base: &Path, extension: &str) -> OsString {
    let mut path = base.as_os_str().to_owned();
    path.push(extension);
    path
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use domain::base::iana::Rtype;

    use super::*;
    use crate::zone::tests::{a_record, name, ns_record};

    pub const KSK: &str = "Kexample.com.+013+06298";
    pub const ZSK: &str = "Kexample.com.+013+09192";
    pub const ED25519: &str = "Kexample.com.+015+07652";

    pub fn test_data(file: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("test-data")
            .join(file)
    }

    pub fn load(base: &str) -> KeyPair {
        KeyPair::load(test_data(base)).unwrap()
    }

    #[test]
    fn load_bind_files() {
        let ksk = load(KSK);
        assert_eq!(ksk.owner(), &name("example.com."));
        assert_eq!(ksk.algorithm(), SecurityAlgorithm::ECDSAP256SHA256);
        assert_eq!(ksk.key_tag(), 6298);
        assert_eq!(ksk.dnskey().flags(), 257);

        let ed = load(ED25519);
        assert_eq!(ed.algorithm(), SecurityAlgorithm::ED25519);
        assert_eq!(ed.key_tag(), 7652);
    }

    #[test]
    fn load_missing_files() {
        let err = KeyPair::load(test_data("Kexample.com.+013+00000")).unwrap_err();
        assert!(err.to_string().contains("loading public key"), "{err}");
    }

    #[test]
    fn private_key_must_match_public_key() {
        let ksk = load(KSK);
        let zsk = std::fs::read_to_string(test_data(&format!("{ZSK}.private"))).unwrap();
        let secret = SecretKeyBytes::parse_from_bind(&zsk).unwrap();
        assert!(KeyPair::new(ksk.owner().clone(), ksk.dnskey().clone(), &secret).is_err());
    }

    #[test]
    fn load_malformed_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(ZSK);
        std::fs::copy(test_data(&format!("{ZSK}.key")), with_extension(&base, ".key")).unwrap();
        std::fs::write(
            with_extension(&base, ".private"),
            "Private-key-format: v1.3\nAlgorithm: 13 (ECDSAP256SHA256)\n",
        )
        .unwrap();
        let err = KeyPair::load(&base).unwrap_err();
        assert!(err.to_string().contains("loading private key"), "{err}");
    }

    #[test]
    fn key_tags_are_joined() {
        assert_eq!(key_tags(&[]), "");
        assert_eq!(key_tags(&[load(KSK)]), "6298");
        assert_eq!(key_tags(&[load(KSK), load(ZSK), load(ED25519)]), "6298,9192,7652");
    }

    #[test]
    fn sign_builds_rrsig_header() {
        let apex = name("example.com.");
        let rrset = [
            ns_record("example.com.", "ns2.example.com."),
            ns_record("example.com.", "ns1.example.com."),
        ];
        for key in [load(ZSK), load(ED25519)] {
            let record = key
                .sign(
                    &rrset,
                    &apex,
                    Ttl::from_secs(1800),
                    Timestamp::from(1_563_466_776),
                    Timestamp::from(1_565_291_976),
                )
                .unwrap();
            assert_eq!(record.owner(), &apex);
            assert_eq!(record.ttl(), Ttl::from_secs(1800));
            let ZoneRecordData::Rrsig(rrsig) = record.data() else {
                panic!("not an RRSIG");
            };
            assert_eq!(rrsig.type_covered(), Rtype::NS);
            assert_eq!(rrsig.algorithm(), key.algorithm());
            assert_eq!(rrsig.labels(), 2);
            assert_eq!(rrsig.original_ttl(), Ttl::from_secs(1800));
            assert_eq!(rrsig.inception().into_int(), 1_563_466_776);
            assert_eq!(rrsig.expiration().into_int(), 1_565_291_976);
            assert_eq!(rrsig.key_tag(), key.key_tag());
            assert_eq!(rrsig.signer_name(), &apex);
            assert_eq!(rrsig.signature().len(), 64);
        }
    }

    #[test]
    fn sign_uses_given_ttl() {
        let key = load(ZSK);
        let apex = name("example.com.");
        let rrset = [a_record("www.example.com.", "192.0.2.10")];
        let record = key
            .sign(&rrset, &apex, Ttl::from_secs(300), Timestamp::from(1000), Timestamp::from(2000))
            .unwrap();
        assert_eq!(record.owner(), &name("www.example.com."));
        assert_eq!(record.ttl(), Ttl::from_secs(300));
        let ZoneRecordData::Rrsig(rrsig) = record.data() else {
            panic!("not an RRSIG");
        };
        assert_eq!(rrsig.labels(), 3);
        assert_eq!(rrsig.original_ttl(), Ttl::from_secs(300));
    }

    #[test]
    fn sign_verifies_with_public_key() {
        use domain::rdata::dnssec::ProtoRrsig;
        use octseq::builder::with_infallible;
        use ring::signature::{UnparsedPublicKey, ED25519 as ED25519_ALG};

        let key = load(ED25519);
        let apex = name("example.com.");
        let rrset = [a_record("www.example.com.", "192.0.2.10")];
        let (inception, expiration) = (Timestamp::from(1000), Timestamp::from(2000));
        let record = key
            .sign(&rrset, &apex, Ttl::from_secs(300), inception, expiration)
            .unwrap();
        let ZoneRecordData::Rrsig(rrsig) = record.data() else {
            panic!("not an RRSIG");
        };

        // RFC 4034, section 3.1.8.1.
        let mut signed = Vec::new();
        with_infallible(|| {
            ProtoRrsig::new(
                Rtype::A,
                SecurityAlgorithm::ED25519,
                3,
                Ttl::from_secs(300),
                expiration,
                inception,
                key.key_tag(),
                apex.clone(),
            )
            .compose_canonical(&mut signed)
        });
        let rr = Record::new(
            rrset[0].owner().clone(),
            rrset[0].class(),
            Ttl::from_secs(300),
            rrset[0].data().clone(),
        );
        with_infallible(|| rr.compose_canonical(&mut signed));

        UnparsedPublicKey::new(&ED25519_ALG, key.dnskey().public_key().as_ref())
            .verify(&signed, rrsig.signature().as_ref())
            .unwrap();
    }

    #[test]
    fn sign_rejects_bad_input() {
        let key = load(ZSK);
        let apex = name("example.com.");
        let ts = Timestamp::from(0);
        assert!(key.sign(&[], &apex, Ttl::from_secs(1), ts, ts).is_err());
        let mixed = [
            a_record("www.example.com.", "192.0.2.1"),
            ns_record("www.example.com.", "ns1.example.com."),
        ];
        assert!(key.sign(&mixed, &apex, Ttl::from_secs(1), ts, ts).is_err());
        let rrset = [a_record("www.example.com.", "192.0.2.1")];
        let other = name("example.org.");
        assert!(key.sign(&rrset, &other, Ttl::from_secs(1), ts, ts).is_err());
    }

    #[test]
    fn ds_digests() {
        let key = load(KSK);
        let sha1 = key.ds(DigestAlgorithm::SHA1).unwrap();
        let sha256 = key.ds(DigestAlgorithm::SHA256).unwrap();
        assert_eq!(sha1.digest().len(), 20);
        assert_eq!(sha256.digest().len(), 32);
        assert_eq!(sha256.key_tag(), 6298);
        assert_eq!(key.cds(DigestAlgorithm::SHA256).unwrap().digest(), sha256.digest());
        assert_eq!(key.cdnskey().unwrap().public_key(), key.dnskey().public_key());
    }
}
