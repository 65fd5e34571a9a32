use std::env;

fn main() {
    // Expose the crate version to the CLI and FFI version strings
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BUTTERFLY_VERSION={version}");

    if env::var("CARGO_FEATURE_C_BINDINGS").is_ok() {
        // Ensure we link against the C runtime
        println!("cargo:rustc-link-lib=c");
    }

    println!("cargo:rerun-if-changed=src/");
    println!("cargo:rerun-if-changed=Cargo.toml");
}
