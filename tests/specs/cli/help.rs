//! Help and version output

use crate::prelude::*;

#[test]
fn help_lists_subcommands() {
    let sandbox = Sandbox::empty();
    sandbox
        .fhd()
        .args(&["--help"])
        .passes()
        .stdout_has("run")
        .stdout_has("unit")
        .stdout_has("ctl");
}

#[test]
fn version_matches_package() {
    let sandbox = Sandbox::empty();
    sandbox
        .fhd()
        .args(&["--version"])
        .passes()
        .stdout_has(env!("CARGO_PKG_VERSION"));
}
