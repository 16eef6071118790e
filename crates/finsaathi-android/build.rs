use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("android") {
        // android_logger writes through liblog
        println!("cargo:rustc-link-lib=log");
    }
}
