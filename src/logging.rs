use env_logger::{Env, Target};

/// Filter applied when `RUST_LOG` is not set
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "warn,llm_infer=debug"
    } else {
        "warn,llm_infer=info"
    }
}

/// Send `log` records to stderr so stdout carries only the answer.
pub fn init(debug: bool) {
    // A logger may already be installed (tests, embedding callers)
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter(debug)))
        .target(Target::Stderr)
        .format_timestamp_millis()
        .format_target(false)
        .try_init();
}
