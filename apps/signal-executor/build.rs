//! Build Script for Signal Executor
//!
//! Emits the `coverage` cfg under cargo-llvm-cov and re-embeds the SQL
//! migrations whenever they change.

use std::env;

fn main() {
    #[cfg(coverage)]
    {
        println!("cargo:rustc-env=LLVM_PROFILE_FILE=coverage-%p-%m.profraw");
    }

    println!("cargo:rerun-if-changed=build.rs");

    // `sqlx::migrate!` embeds these at compile time
    println!("cargo:rerun-if-changed=migrations");

    if env::var("CARGO_LLVM_COV").is_ok()
        || env::var("LLVM_PROFILE_FILE").is_ok()
        || env::var("RUSTFLAGS")
            .map(|f| f.contains("instrument-coverage"))
            .unwrap_or(false)
    {
        println!("cargo:rustc-cfg=coverage");
    }
}
