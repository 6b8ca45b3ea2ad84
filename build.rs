fn main() {
    println!("cargo:rerun-if-changed=src/ffi.rs");

    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let config = cbindgen::Config::from_file("cbindgen.toml").unwrap_or_default();

    if let Ok(bindings) = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .with_language(cbindgen::Language::C)
        .with_include_guard("DSCAM_H")
        .generate()
    {
        bindings.write_to_file(format!("{}/include/dscam.h", crate_dir));
    }
}
