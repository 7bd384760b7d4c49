fn main() {
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        // Timestamp is two plain integers; Copy lets callers compare
        // and pass it around without explicit clones.
        .type_attribute("qkv.storage.Timestamp", "#[derive(Copy)]")
        .compile(&["proto/storage.proto"], &["proto"])
        .unwrap();
}
