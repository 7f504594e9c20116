//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "build"
//! fleet_type: "source"
//! fleet_scope: "build"
//! fleet_description: "Build metadata emission for version reporting."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Outside a git checkout vergen falls back to placeholder values instead of failing.
    EmitBuilder::builder()
        .all_build()
        .all_cargo()
        .all_git()
        .emit()?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
