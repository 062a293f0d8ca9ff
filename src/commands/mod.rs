//! The commands of _zonesign_.
pub mod check;
pub mod run;
pub mod sign;

use clap::builder::ValueParser;

use crate::env::Env;
use crate::error::Error;
use crate::zone::StoredName;

#[derive(Clone, Debug, clap::Subcommand)]
pub enum Command {
    /// Sign a zone once
    ///
    /// The zone is read from the zone file, signed with every given key and
    /// written to the signed zone file. Signatures are valid from three
    /// hours before now until 21 days from now.
    ///
    /// Keys are given as the path of the BIND key files without the `.key`
    /// or `.private` extension, e.g. `Kexample.com.+013+06298`.
    #[command(name = "sign", verbatim_doc_comment)]
    Sign(self::sign::Sign),

    /// Report whether a signed zone needs to be signed again
    ///
    /// Prints `stale` if the signature over the SOA record expires within
    /// 14 days or if the file is missing, `fresh` otherwise.
    #[command(name = "check")]
    Check(self::check::Check),

    /// Keep the zones of a configuration file signed
    ///
    /// Zones whose signed zone is stale are signed at startup. After that
    /// every zone is signed again each refresh interval until interrupted.
    #[command(name = "run")]
    Run(self::run::Run),
}

impl Command {
    pub fn execute(self, env: impl Env) -> Result<(), Error> {
        match self {
            Self::Sign(sign) => sign.execute(env),
            Self::Check(check) => check.execute(env),
            Self::Run(run) => run.execute(env),
        }
    }
}

/// A value parser for domain names.
fn name_parser() -> ValueParser {
    ValueParser::new(|arg: &str| {
        arg.parse::<StoredName>()
            .map_err(|err| Error::from(format!("invalid domain name '{arg}': {err}")))
    })
}
