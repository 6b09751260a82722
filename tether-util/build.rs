//! Compile time configurations for the util crate
fn main() {
    // TETHER_PKG_NAME names the folders created under `~/.config`,
    // `~/.local/state` and friends. Renaming it orphans any files written by
    // a previous build, including cached hub assignments.
    println!("cargo::rustc-env=TETHER_PKG_NAME=tether");
}
