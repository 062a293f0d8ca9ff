use std::path::Path;
use std::process::Output;

pub const TEST_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/test-data");

/// Run the `zonesign` binary with `args` in `cwd`.
#[track_caller]
pub fn zonesign(cwd: &Path, args: &[&str]) -> Output {
    test_bin::get_test_bin("zonesign")
        .current_dir(cwd)
        .args(args)
        .output()
        .unwrap()
}

/// Copy files from the test data into `dir`.
pub fn copy_test_data(dir: &Path, files: &[&str]) {
    for file in files {
        std::fs::copy(Path::new(TEST_DATA_DIR).join(file), dir.join(file)).unwrap();
    }
}

pub fn stdout(output: &Output) -> &str {
    std::str::from_utf8(&output.stdout).unwrap()
}

pub fn stderr(output: &Output) -> &str {
    std::str::from_utf8(&output.stderr).unwrap()
}
