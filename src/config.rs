use std::env;
use std::time::Duration;

use crate::error::CoreError;

#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// How often the reminder scheduler re-evaluates the cache.
    pub tick_interval: Duration,
    /// Forward look-ahead window inside which a reminder counts as due.
    /// Must stay larger than `tick_interval` so no trigger time falls
    /// between two consecutive scans.
    pub look_ahead: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            look_ahead: Duration::from_secs(60),
        }
    }
}

impl CoreConfig {
    pub fn new_from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("REMINDER_TICK_SECS") {
            config.tick_interval = Duration::from_secs(parse_secs("REMINDER_TICK_SECS", &raw)?);
        }
        if let Ok(raw) = env::var("REMINDER_WINDOW_SECS") {
            config.look_ahead = Duration::from_secs(parse_secs("REMINDER_WINDOW_SECS", &raw)?);
        }

        Ok(config)
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<u64, CoreError> {
    let secs: u64 = raw
        .parse()
        .map_err(|_| CoreError::Validation(format!("{} must be an integer, got {:?}", name, raw)))?;
    if secs == 0 {
        return Err(CoreError::Validation(format!("{} must be positive", name)));
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_window_wider_than_tick() {
        let config = CoreConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(30));
        assert_eq!(config.look_ahead, Duration::from_secs(60));
        assert!(config.look_ahead > config.tick_interval);
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(parse_secs("REMINDER_TICK_SECS", "0").is_err());
        assert!(parse_secs("REMINDER_TICK_SECS", "abc").is_err());
        assert_eq!(parse_secs("REMINDER_TICK_SECS", "45").ok(), Some(45));
    }
}
