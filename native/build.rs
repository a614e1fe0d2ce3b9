// Build script for the keychain native module
// Sets up napi-rs and links the keychain framework on Apple targets

use std::env;

fn main() {
    napi_build::setup();

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("apple") {
        println!("cargo:rustc-link-lib=framework=Security");
        println!("cargo:rustc-link-lib=framework=CoreFoundation");
    } else {
        println!(
            "cargo:warning=Building for {} without Security.framework; keychain calls will report errSecNotAvailable",
            target
        );
    }

    println!("cargo:rustc-env=BUILD_TARGET={}", target);
}
