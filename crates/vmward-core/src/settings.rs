//! Settings from `VMWARD_*` environment variables.
//!
//! Unset or blank variables keep their defaults. Values that do not parse
//! are rejected rather than ignored, and so are numbers outside a setting's
//! range: every spend and TTL limit must be finite and non-negative, and the
//! balance guard is a percentage. Paths have `~` expanded against the
//! home directory and are made absolute.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;
use vmward_types::ConfigError;
use vmward_types::config::Settings;

use crate::env::{Environment, NativeEnvironment};

/// Prefix shared by every settings variable.
pub const ENV_PREFIX: &str = "VMWARD_";

/// Every variable the loader reads, without the prefix.
pub const VARIABLES: &[&str] = &[
    "PAYER_ADDRESS",
    "IDENTITY_PATH",
    "SSH_PUBKEY_PATH",
    "LEDGER_PATH",
    "GATEWAY_URL",
    "REQUEST_TIMEOUT_SECS",
    "MAX_CONCURRENT_VMS",
    "DEFAULT_TTL_HOURS",
    "MAX_TTL_HOURS",
    "BALANCE_GUARD_PERCENT",
    "COST_THRESHOLD",
    "MAX_SESSION_SPEND",
    "DEFAULT_OS_IMAGE",
    "POLL_ATTEMPTS",
    "POLL_DELAY_SECS",
];

/// Accepted range for a numeric setting.
#[derive(Debug, Clone, Copy)]
enum Bound {
    NonNegative,
    Percent,
}

impl Bound {
    fn allows(self, value: f64) -> bool {
        match self {
            Self::NonNegative => value.is_finite() && value >= 0.0,
            Self::Percent => (0.0..=100.0).contains(&value),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::NonNegative => "must be a finite number of at least 0",
            Self::Percent => "must be a percentage between 0 and 100",
        }
    }
}

struct Vars<'a> {
    env: &'a dyn Environment,
}

impl Vars<'_> {
    fn raw(&self, key: &str) -> Option<(String, String)> {
        let name = format!("{ENV_PREFIX}{key}");
        let value = self.env.get_var(&name)?;
        let value = value.trim();
        (!value.is_empty()).then(|| (name, value.to_owned()))
    }

    fn string(&self, key: &str) -> Option<String> {
        self.raw(key).map(|(_, value)| value)
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some((var, value)) = self.raw(key) else {
            return Ok(None);
        };
        value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            })
    }

    fn number(&self, key: &str, bound: Bound) -> Result<Option<f64>, ConfigError> {
        let Some((var, value)) = self.raw(key) else {
            return Ok(None);
        };
        let reason = match value.parse::<f64>() {
            Ok(number) if bound.allows(number) => return Ok(Some(number)),
            Ok(_) => bound.describe().to_owned(),
            Err(e) => e.to_string(),
        };
        Err(ConfigError::Invalid { var, value, reason })
    }

    fn set_number(&self, key: &str, bound: Bound, slot: &mut f64) -> Result<(), ConfigError> {
        if let Some(value) = self.number(key, bound)? {
            *slot = value;
        }
        Ok(())
    }

    fn set<T>(&self, key: &str, slot: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some(value) = self.parse(key)? {
            *slot = value;
        }
        Ok(())
    }
}

/// Build [`Settings`] from the environment.
///
/// `home_dir` is used for `~` expansion; pass `dirs::home_dir()` in
/// production.
pub fn load_settings(
    env: &dyn Environment,
    home_dir: Option<PathBuf>,
) -> Result<Settings, ConfigError> {
    let vars = Vars { env };
    let mut settings = Settings::default();

    settings.payer_address = vars.string("PAYER_ADDRESS");
    vars.set("IDENTITY_PATH", &mut settings.identity_path)?;
    vars.set("SSH_PUBKEY_PATH", &mut settings.ssh_pubkey_path)?;
    vars.set("LEDGER_PATH", &mut settings.ledger_path)?;
    if let Some(url) = vars.string("GATEWAY_URL") {
        settings.gateway_url = url;
    }
    vars.set("REQUEST_TIMEOUT_SECS", &mut settings.request_timeout_secs)?;
    vars.set("MAX_CONCURRENT_VMS", &mut settings.max_concurrent_vms)?;
    vars.set_number("DEFAULT_TTL_HOURS", Bound::NonNegative, &mut settings.default_ttl_hours)?;
    vars.set_number("MAX_TTL_HOURS", Bound::NonNegative, &mut settings.max_ttl_hours)?;
    vars.set_number(
        "BALANCE_GUARD_PERCENT",
        Bound::Percent,
        &mut settings.balance_guard_percent,
    )?;
    vars.set_number("COST_THRESHOLD", Bound::NonNegative, &mut settings.cost_threshold)?;
    settings.max_session_spend = vars.number("MAX_SESSION_SPEND", Bound::NonNegative)?;
    vars.set("DEFAULT_OS_IMAGE", &mut settings.default_os_image)?;
    vars.set("POLL_ATTEMPTS", &mut settings.poll_attempts)?;
    vars.set_number("POLL_DELAY_SECS", Bound::NonNegative, &mut settings.poll_delay_secs)?;

    settings.identity_path = resolve_path(&settings.identity_path, home_dir.as_deref())?;
    settings.ssh_pubkey_path = resolve_path(&settings.ssh_pubkey_path, home_dir.as_deref())?;
    settings.ledger_path = resolve_path(&settings.ledger_path, home_dir.as_deref())?;

    debug!(
        ledger = %settings.ledger_path.display(),
        gateway = %settings.gateway_url,
        "settings loaded"
    );
    Ok(settings)
}

/// Load from the process environment, expanding `~` to the user's home.
pub fn load_from_process() -> Result<Settings, ConfigError> {
    load_settings(&NativeEnvironment, dirs::home_dir())
}

/// Expand a leading `~` and make the path absolute.
pub fn resolve_path(path: &Path, home_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let expanded = if let Ok(rest) = path.strip_prefix("~") {
        let home = home_dir.ok_or(ConfigError::NoHomeDir)?;
        home.join(rest)
    } else {
        path.to_path_buf()
    };
    std::path::absolute(&expanded).map_err(|source| ConfigError::Unreadable {
        path: expanded.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvironment;
    use vmward_types::OsImage;

    fn home() -> Option<PathBuf> {
        Some(PathBuf::from("/home/agent"))
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let settings = load_settings(&MapEnvironment::new(), home()).unwrap();
        assert_eq!(
            settings.ledger_path,
            PathBuf::from("/home/agent/.vmward/inventory.json")
        );
        assert_eq!(
            settings.ssh_pubkey_path,
            PathBuf::from("/home/agent/.ssh/id_ed25519.pub")
        );
        assert_eq!(settings.max_concurrent_vms, 3);
        assert!(settings.max_session_spend.is_none());
        assert!(settings.payer_address.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let env: MapEnvironment = [
            ("VMWARD_PAYER_ADDRESS", "0xpayer"),
            ("VMWARD_LEDGER_PATH", "/var/lib/vmward/ledger.json"),
            ("VMWARD_MAX_CONCURRENT_VMS", "5"),
            ("VMWARD_MAX_TTL_HOURS", "48"),
            ("VMWARD_MAX_SESSION_SPEND", " 25.5 "),
            ("VMWARD_DEFAULT_OS_IMAGE", "debian12"),
            ("VMWARD_COST_THRESHOLD", ""),
        ]
        .into_iter()
        .collect();

        let settings = load_settings(&env, home()).unwrap();
        assert_eq!(settings.payer_address.as_deref(), Some("0xpayer"));
        assert_eq!(
            settings.ledger_path,
            PathBuf::from("/var/lib/vmward/ledger.json")
        );
        assert_eq!(settings.max_concurrent_vms, 5);
        assert_eq!(settings.max_ttl_hours, 48.0);
        assert_eq!(settings.max_session_spend, Some(25.5));
        assert_eq!(settings.default_os_image, OsImage::Debian12);
        // blank keeps the default
        assert_eq!(settings.cost_threshold, 10.0);
    }

    #[test]
    fn bad_number_is_an_error() {
        let env: MapEnvironment = [("VMWARD_MAX_CONCURRENT_VMS", "three")].into_iter().collect();
        let err = load_settings(&env, home()).unwrap_err();
        match err {
            ConfigError::Invalid { var, value, .. } => {
                assert_eq!(var, "VMWARD_MAX_CONCURRENT_VMS");
                assert_eq!(value, "three");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_finite_limits_are_errors() {
        for (var, value) in [
            ("VMWARD_MAX_TTL_HOURS", "NaN"),
            ("VMWARD_DEFAULT_TTL_HOURS", "inf"),
            ("VMWARD_BALANCE_GUARD_PERCENT", "NaN"),
            ("VMWARD_COST_THRESHOLD", "nan"),
            ("VMWARD_MAX_SESSION_SPEND", "inf"),
            ("VMWARD_POLL_DELAY_SECS", "-inf"),
        ] {
            let env: MapEnvironment = [(var, value)].into_iter().collect();
            match load_settings(&env, home()).unwrap_err() {
                ConfigError::Invalid {
                    var: got, value: raw, ..
                } => {
                    assert_eq!(got, var);
                    assert_eq!(raw, value);
                }
                other => panic!("unexpected error for {var}: {other}"),
            }
        }
    }

    #[test]
    fn negative_limits_are_errors() {
        for var in [
            "VMWARD_DEFAULT_TTL_HOURS",
            "VMWARD_MAX_TTL_HOURS",
            "VMWARD_COST_THRESHOLD",
            "VMWARD_MAX_SESSION_SPEND",
            "VMWARD_POLL_DELAY_SECS",
        ] {
            let env: MapEnvironment = [(var, "-1")].into_iter().collect();
            let err = load_settings(&env, home()).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{var}");
            assert!(err.to_string().contains("at least 0"), "{var}: {err}");
        }
    }

    #[test]
    fn guard_percent_must_be_a_percentage() {
        for bad in ["150", "-5", "100.5"] {
            let env: MapEnvironment = [("VMWARD_BALANCE_GUARD_PERCENT", bad)].into_iter().collect();
            let err = load_settings(&env, home()).unwrap_err();
            assert!(err.to_string().contains("between 0 and 100"), "{bad}: {err}");
        }

        for good in ["0", "100", "37.5"] {
            let env: MapEnvironment = [("VMWARD_BALANCE_GUARD_PERCENT", good)].into_iter().collect();
            let settings = load_settings(&env, home()).unwrap();
            assert_eq!(settings.balance_guard_percent, good.parse::<f64>().unwrap());
        }
    }

    #[test]
    fn zero_limits_are_accepted() {
        let env: MapEnvironment = [
            ("VMWARD_COST_THRESHOLD", "0"),
            ("VMWARD_MAX_SESSION_SPEND", "0"),
            ("VMWARD_POLL_DELAY_SECS", "0"),
        ]
        .into_iter()
        .collect();
        let settings = load_settings(&env, home()).unwrap();
        assert_eq!(settings.cost_threshold, 0.0);
        assert_eq!(settings.max_session_spend, Some(0.0));
        assert_eq!(settings.poll_delay_secs, 0.0);
    }

    #[test]
    fn bad_os_image_is_an_error() {
        let env: MapEnvironment = [("VMWARD_DEFAULT_OS_IMAGE", "arch")].into_iter().collect();
        let err = load_settings(&env, home()).unwrap_err();
        assert!(err.to_string().contains("Unknown os_image='arch'"));
    }

    #[test]
    fn tilde_needs_home() {
        let err = load_settings(&MapEnvironment::new(), None).unwrap_err();
        assert!(matches!(err, ConfigError::NoHomeDir));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let path = resolve_path(Path::new("ledger.json"), None).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("ledger.json"));

        let path = resolve_path(Path::new("~/x/y.json"), Some(Path::new("/h"))).unwrap();
        assert_eq!(path, PathBuf::from("/h/x/y.json"));
    }
}
