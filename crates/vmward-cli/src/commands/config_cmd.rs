//! `vmward config` -- display resolved settings.
//!
//! # Examples
//!
//! ```text
//! vmward config show
//! vmward config get cost_threshold
//! vmward config vars
//! ```

use vmward_core::settings::{ENV_PREFIX, VARIABLES};
use vmward_types::config::Settings;

/// Display the resolved settings as formatted JSON.
pub fn config_show(settings: &Settings) {
    match serde_json::to_string_pretty(settings) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: failed to serialize settings: {e}"),
    }
}

/// Display one setting. Returns `false` when the field does not exist.
pub fn config_get(settings: &Settings, name: &str) -> bool {
    let value = serde_json::to_value(settings).unwrap_or_default();
    match value.get(name) {
        Some(v) => {
            match v {
                serde_json::Value::String(s) => println!("{s}"),
                other => println!("{other}"),
            }
            true
        }
        None => {
            let available: Vec<&str> = value
                .as_object()
                .map(|m| m.keys().map(|k| k.as_str()).collect())
                .unwrap_or_default();
            eprintln!("error: unknown setting '{name}'");
            eprintln!("available settings: {}", available.join(", "));
            false
        }
    }
}

/// List every environment variable the settings loader reads.
pub fn config_vars() {
    for var in variable_names() {
        println!("{var}");
    }
}

fn variable_names() -> Vec<String> {
    VARIABLES
        .iter()
        .map(|v| format!("{ENV_PREFIX}{v}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_show_does_not_panic() {
        config_show(&Settings::default());
    }

    #[test]
    fn config_get_known_field() {
        assert!(config_get(&Settings::default(), "cost_threshold"));
        assert!(config_get(&Settings::default(), "gateway_url"));
    }

    #[test]
    fn config_get_unknown_field() {
        assert!(!config_get(&Settings::default(), "nonexistent"));
    }

    #[test]
    fn every_variable_is_prefixed() {
        let names = variable_names();
        assert!(names.contains(&"VMWARD_LEDGER_PATH".to_string()));
        assert!(names.iter().all(|n| n.starts_with("VMWARD_")));
    }
}
