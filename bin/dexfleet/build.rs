//! ---
//! fleet_section: "01-core-functionality"
//! fleet_subsection: "binary"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Build script emitting version metadata for the launcher."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Source tarballs have no git metadata; VersionInfo falls back to "unknown".
    EmitBuilder::builder()
        .all_build()
        .all_cargo()
        .all_git()
        .emit()?;
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
