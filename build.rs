use std::env;
use std::fs;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let descriptor_version_path = Path::new(&out_dir).join("descriptor_version.rs");

    // Read descriptor version from Cargo.toml metadata
    let cargo_manifest = env::var("CARGO_MANIFEST_DIR").unwrap();
    let cargo_toml_path = Path::new(&cargo_manifest).join("Cargo.toml");
    let cargo_toml_content = fs::read_to_string(&cargo_toml_path)
        .expect("Failed to read Cargo.toml");

    let cargo_toml: toml::Value = cargo_toml_content.parse()
        .expect("Failed to parse Cargo.toml");

    let descriptor_version = cargo_toml
        .get("package")
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("modulebus"))
        .and_then(|g| g.get("descriptor_version"))
        .and_then(|v| v.as_integer())
        .expect("Failed to find package.metadata.modulebus.descriptor_version in Cargo.toml");

    let version_content = format!(
        "// Auto-generated descriptor version from Cargo.toml metadata\n\
         // Source: package.metadata.modulebus.descriptor_version = {}\n\
         pub const BASE_DESCRIPTOR_VERSION: u32 = {};\n",
        descriptor_version, descriptor_version
    );

    fs::write(&descriptor_version_path, version_content)
        .expect("Failed to write descriptor_version.rs");

    println!("cargo:rerun-if-changed=Cargo.toml");
}
