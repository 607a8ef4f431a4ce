fn main() {
    // exposes PKG_VERSION, TARGET, RUSTC_VERSION, ... to `cli::build_info`
    built::write_built_file().expect("Failed to acquire build-time information");
}
