use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "TASKDECK_LOG";

/// Installs a global fmt subscriber filtered by `TASKDECK_LOG`, falling back
/// to `default_directive`. Returns `false` if a subscriber was already set.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_target(false)
        .try_init()
        .is_ok()
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}
