use anyhow::{bail, Result};
use spuddns_domain::config::DEFAULT_CONFIG_PATH;
use spuddns_domain::AppConfig;
use tracing::Level;

pub fn load_config(path: Option<&str>) -> Result<AppConfig, spuddns_domain::DomainError> {
    AppConfig::load(path.unwrap_or(DEFAULT_CONFIG_PATH))
}

/// Maps the slog-style numeric level from the configuration onto a tracing
/// filter and installs the subscriber.
pub fn init_logging(config: &AppConfig) {
    let level = match config.log_level {
        level if level <= -4 => Level::DEBUG,
        level if level <= 0 => Level::INFO,
        level if level <= 4 => Level::WARN,
        _ => Level::ERROR,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

const UNPRIVILEGED_UID: libc::uid_t = 65534;
const UNPRIVILEGED_GID: libc::gid_t = 65534;

/// Drops to nobody once the listeners are bound. The group has to go first;
/// after setuid there is no way back.
pub fn drop_privileges() -> Result<()> {
    let gid_result = unsafe { libc::setgid(UNPRIVILEGED_GID) };
    if gid_result != 0 {
        bail!("setgid failed: {}", std::io::Error::last_os_error());
    }
    let uid_result = unsafe { libc::setuid(UNPRIVILEGED_UID) };
    if uid_result != 0 {
        bail!("setuid failed: {}", std::io::Error::last_os_error());
    }
    Ok(())
}
