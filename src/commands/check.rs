use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::builder::ValueParser;
use clap::Parser;
use tracing::debug;

use crate::env::Env;
use crate::error::{Error, Result};
use crate::staleness::needs_resign;

#[derive(Clone, Debug, Parser, PartialEq, Eq)]
pub struct Check {
    /// Check as of this time instead of now, in RFC 3339 format
    #[arg(long = "at", value_name = "TIME", value_parser = ValueParser::new(parse_time))]
    at: Option<DateTime<Utc>>,

    /// The signed zone file
    #[arg(value_name = "SIGNED-FILE")]
    signed_file: PathBuf,
}

fn parse_time(arg: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(arg)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| Error::from(format!("invalid time '{arg}': {err}")))
}

impl Check {
    pub fn execute(self, env: impl Env) -> Result<()> {
        let now = self.at.unwrap_or_else(Utc::now);
        let path = env.in_cwd(&self.signed_file);
        let stale = match File::open(&path) {
            Ok(file) => needs_resign(BufReader::new(file), now),
            Err(err) => {
                debug!("cannot open {}: {err}", path.display());
                true
            }
        };
        writeln!(env.stdout(), "{}", if stale { "stale" } else { "fresh" });
        Ok(())
    }
}
