// Build script for vpgmctl - embeds version at compile time

fn main() {
    // Release builds may set VPGM_VERSION; otherwise use Cargo.toml
    let version =
        std::env::var("VPGM_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=VPGM_VERSION={}", version);

    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=VPGM_VERSION");
}
