//! Subscriber installation for hosts and the CLI

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Where run events go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Readable lines at debug level; phase and resolver decisions included
    Development,
    /// One JSON object per event at info level, for log shipping
    Production,
    /// Bare registry; `init_test_capture()` layers on top of it
    Test,
}

static INIT_ONCE: Once = Once::new();

/// Install the global subscriber for `profile`
///
/// Only the first call has effect. `RUST_LOG` overrides the default filter,
/// which covers every `graphsweep_*` crate.
///
/// ```
/// use graphsweep_core::logging_facility::{init, Profile};
///
/// init(Profile::Production);
/// ```
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| match profile {
        Profile::Development => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_env_filter(filter("graphsweep=debug"))
                .init();
        }
        Profile::Production => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter("graphsweep=info"))
                .init();
        }
        Profile::Test => {
            tracing_subscriber::registry().init();
        }
    });
}

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}
