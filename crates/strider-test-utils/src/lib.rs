pub mod fixtures;
pub mod harness;
pub mod network;

pub use fixtures::{InputScript, DT};
pub use harness::LoopbackHarness;
pub use network::NetworkConditions;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(
                    "strider=debug,strider_state=debug,strider_network=debug,strider_test_utils=debug",
                )
            }))
            .with_test_writer()
            .init();
    });
}
