use std::env;
use std::path::PathBuf;

fn main() {
    let target = env::var("TARGET").unwrap_or_default();
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");

    if target.contains("aarch64") {
        let linker_script = PathBuf::from(&manifest_dir).join("src/arch/aarch64/link.ld");
        println!("cargo:rustc-link-arg=-T{}", linker_script.display());
        println!("cargo:rerun-if-changed=src/arch/aarch64/link.ld");
    }
}
