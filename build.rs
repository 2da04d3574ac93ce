fn main() {
    #[cfg(feature = "cxxbridge")]
    {
        cxx_build::bridge("src/cxx_api/mod.rs")
            .std("c++17")
            .compile("mm2batch-cxx");
        println!("cargo:rerun-if-changed=src/cxx_api/mod.rs");
    }
}
