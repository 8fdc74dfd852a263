//! Header compression tests: HPACK, SPDY zlib and the context pool


/// Install a test log writer once; set RUST_LOG to see output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
