pub mod args;
pub mod commands;
pub mod config;
pub mod env;
pub mod error;
pub mod keys;
pub mod log;
pub mod nsec;
pub mod signer;
pub mod signers;
pub mod staleness;
pub mod zone;
pub mod zonefile;

use clap::Parser;

pub use args::Args;
use env::Env;
use error::Error;

/// Parse the command line of `env`.
pub fn parse_args(env: impl Env) -> Result<Args, Error> {
    Args::try_parse_from(env.args_os()).map_err(Error::from)
}

/// Run the program in `env`, returning its exit code.
pub fn run(env: impl Env) -> u8 {
    let res = parse_args(&env).and_then(|args| args.execute(&env));
    match res {
        Ok(()) => 0,
        Err(err) => {
            err.pretty_print(&env);
            err.exit_code()
        }
    }
}
