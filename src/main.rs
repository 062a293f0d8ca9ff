use std::process::ExitCode;

use zonesign::env::RealEnv;

fn main() -> ExitCode {
    ExitCode::from(zonesign::run(RealEnv))
}
