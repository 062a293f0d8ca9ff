use super::commands::Command;
use super::env::Env;
use super::error::Error;
use super::log::init_tracing;

#[derive(Clone, Debug, clap::Parser)]
#[command(version, disable_help_subcommand = true)]
pub struct Args {
    /// Print more diagnostics, repeat for more detail
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn execute(self, env: impl Env) -> Result<(), Error> {
        init_tracing(&env, self.verbose);
        self.command.execute(env)
    }
}

impl From<Command> for Args {
    fn from(value: Command) -> Self {
        Args {
            verbose: 0,
            command: value,
        }
    }
}
