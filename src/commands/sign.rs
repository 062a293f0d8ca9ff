use std::path::PathBuf;

use clap::Parser;

use crate::env::Env;
use crate::error::{Context, Error, Result};
use crate::keys::KeyPair;
use crate::log::Logger;
use crate::signer::{default_signed_file, zonefile_directory, Signer};
use crate::zone::StoredName;

use super::name_parser;

#[derive(Clone, Debug, Parser, PartialEq, Eq)]
pub struct Sign {
    /// Origin of the zone [default: owner of the first key]
    #[arg(short = 'o', long = "origin", value_name = "DOMAIN", value_parser = name_parser())]
    origin: Option<StoredName>,

    /// Directory to write the signed zone to [default: directory of the zone file]
    #[arg(short = 'd', long = "directory", value_name = "DIR")]
    directory: Option<PathBuf>,

    /// File name of the signed zone [default: db.<origin>.signed]
    #[arg(short = 'f', long = "signed-file", value_name = "NAME")]
    signed_file: Option<String>,

    /// The unsigned zone file
    #[arg(value_name = "ZONEFILE")]
    zonefile: PathBuf,

    /// The keys to sign with
    #[arg(value_name = "KEY", required = true)]
    keys: Vec<PathBuf>,
}

impl Sign {
    pub fn execute(self, env: impl Env) -> Result<()> {
        let keys = self
            .keys
            .iter()
            .map(|key| KeyPair::load(env.in_cwd(key)))
            .collect::<Result<Vec<_>>>()?;
        let origin = match self.origin {
            Some(origin) => origin,
            None => keys
                .first()
                .map(|key| key.owner().clone())
                .ok_or("no keys given")?,
        };

        let zonefile = env.in_cwd(&self.zonefile).into_owned();
        let directory = match &self.directory {
            Some(dir) => env.in_cwd(dir).into_owned(),
            None => zonefile_directory(&zonefile),
        };
        let signed_file = self
            .signed_file
            .unwrap_or_else(|| default_signed_file(&origin));

        let signer = Signer::new(
            origin.clone(),
            keys,
            zonefile,
            directory,
            signed_file,
            Logger::new(&env),
        )
        .with_context(|| format!("setting up zone {origin}"))?;

        // The outcome has been logged already.
        signer
            .sign_and_log()
            .map(|_| ())
            .map_err(|_| Error::from(format!("zone {origin} was not signed")))
    }
}
