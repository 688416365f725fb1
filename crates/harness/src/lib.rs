pub mod doubles;
pub mod faults;
pub mod fleet;
pub mod node;

pub use doubles::{ManualClock, ScriptedIds};
pub use faults::FaultyStorage;
pub use fleet::TestFleet;
pub use node::TestNode;

/// Routes `tracing` output through the test writer. Safe to call from every
/// test; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
