//! Argument node resolution from flags and environment
//!
//! A node named `server-addr` is read from `--server-addr=value` on the
//! command line and from `SERVER_ADDR` in the environment. When both are
//! present the flag wins. Empty values count as unset.

use clap::{Arg, ArgAction, Command};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("env pattern is valid"));

/// Environment variable name for an argument node
///
/// ```
/// use trellis_engine::namespace::env_var_name;
///
/// assert_eq!(env_var_name("addr"), "ADDR");
/// assert_eq!(env_var_name("social.machine-id"), "SOCIAL_MACHINE_ID");
/// assert_eq!(env_var_name("a::grpc_addr"), "A_GRPC_ADDR");
/// ```
pub fn env_var_name(node: &str) -> String {
    let replaced = NON_ALPHANUMERIC.replace_all(node, "_");
    replaced
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .to_uppercase()
}

/// Parse `--name value` / `--name=value` for each declared node.
///
/// Unknown arguments (test harness flags, other tools' options) are ignored.
pub(crate) fn parse_flags(names: &[String], args: &[String]) -> BTreeMap<String, String> {
    let mut command = Command::new("trellis")
        .no_binary_name(false)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .ignore_errors(true);
    for name in names {
        command = command.arg(
            Arg::new(name.clone())
                .long(name.clone())
                .num_args(1)
                .action(ArgAction::Set),
        );
    }

    let matches = match command.try_get_matches_from(declared_only(names, args)) {
        Ok(matches) => matches,
        Err(e) => {
            warn!(target: "trellis::namespace", error = %e, "Could not parse command line");
            return BTreeMap::new();
        }
    };

    let mut values = BTreeMap::new();
    for name in names {
        if let Ok(Some(value)) = matches.try_get_one::<String>(name) {
            values.insert(name.clone(), value.clone());
        }
    }
    values
}

/// Keep the binary name and the `--name[=value]` arguments of declared
/// nodes. clap stops at the first unknown argument even when ignoring
/// errors, so foreign flags are dropped before parsing.
fn declared_only(names: &[String], args: &[String]) -> Vec<String> {
    let mut kept: Vec<String> = args.iter().take(1).cloned().collect();
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        let Some(flag) = arg.strip_prefix("--") else {
            continue;
        };
        let (name, inline_value) = match flag.split_once('=') {
            Some((name, _)) => (name, true),
            None => (flag, false),
        };
        if !names.iter().any(|n| n == name) {
            continue;
        }
        kept.push(arg.clone());
        if !inline_value {
            if let Some(value) = rest.next() {
                kept.push(value.clone());
            }
        }
    }
    kept
}

/// Resolve one argument node: flag first, then environment
pub(crate) fn resolve_arg(name: &str, flags: &BTreeMap<String, String>) -> Option<String> {
    let env_name = env_var_name(name);
    let env = std::env::var(&env_name).ok().filter(|v| !v.is_empty());
    let flag = flags.get(name).filter(|v| !v.is_empty());
    match (flag, env) {
        (Some(flag), Some(env)) => {
            if flag != &env {
                warn!(
                    target: "trellis::namespace",
                    node = name,
                    env = %env_name,
                    "Flag and environment variable disagree; using flag"
                );
            }
            Some(flag.clone())
        }
        (Some(flag), None) => {
            debug!(target: "trellis::namespace", node = name, "Argument from flag");
            Some(flag.clone())
        }
        (None, Some(env)) => {
            debug!(target: "trellis::namespace", node = name, env = %env_name, "Argument from environment");
            Some(env)
        }
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("bin")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("addr"), "ADDR");
        assert_eq!(env_var_name("machine-id"), "MACHINE_ID");
        assert_eq!(env_var_name("9lives"), "LIVES");
        assert_eq!(env_var_name("a.b c"), "A_B_C");
        assert_eq!(env_var_name("hotel--frontend..addr"), "HOTEL_FRONTEND_ADDR");
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_arg_ignores_empty_values() {
        let mut flags = BTreeMap::new();
        temp_env::with_var("TRELLIS_ARGS_EMPTY", Some(""), || {
            assert_eq!(resolve_arg("trellis-args-empty", &flags), None);
        });

        flags.insert("trellis-args-empty".to_string(), String::new());
        temp_env::with_var("TRELLIS_ARGS_EMPTY", Some("from-env"), || {
            assert_eq!(
                resolve_arg("trellis-args-empty", &flags).as_deref(),
                Some("from-env")
            );
        });
    }

    #[test]
    fn test_parse_flags_both_forms() {
        let names = vec!["addr".to_string(), "port".to_string()];
        let flags = parse_flags(&names, &argv(&["--addr=localhost", "--port", "80"]));
        assert_eq!(flags.get("addr").map(String::as_str), Some("localhost"));
        assert_eq!(flags.get("port").map(String::as_str), Some("80"));
    }

    #[test]
    fn test_parse_flags_ignores_unknown() {
        let names = vec!["addr".to_string()];
        let flags = parse_flags(
            &names,
            &argv(&["--test-threads=1", "--addr=x", "--nocapture"]),
        );
        assert_eq!(flags.get("addr").map(String::as_str), Some("x"));
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn test_parse_flags_absent() {
        let names = vec!["addr".to_string()];
        assert!(parse_flags(&names, &argv(&[])).is_empty());
    }
}
