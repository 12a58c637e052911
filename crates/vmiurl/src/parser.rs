//! `vmi://` URL parser.
//!
//! Grammar: `vmi://[hypervisor]/[target]?[key=value[&key=value...]]`.
//! Every violation is reported immediately; there is no partial parsing.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{BackendConfig, DriverConfig, DriverType, Resolution};
use std::borrow::Cow;
use tracing::debug;

/// The only accepted URL scheme.
pub const SCHEME: &str = "vmi";

/// Keys understood by [`Grammar::Simple`].
pub const SIMPLE_KEYS: &[&str] = &["kvmi_unix_socket"];

/// Keys understood by [`Grammar::Extended`].
pub const EXTENDED_KEYS: &[&str] = &[
    "vm_name",
    "kvm_unix_socket",
    "memflow_connector_name",
    "memflow_connector_args",
];

/// Query key sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grammar {
    /// Target required in the path, at most one `kvmi_unix_socket` key.
    Simple,
    /// Target from the path or `vm_name` (may be absent), composite backend
    /// configuration.
    #[default]
    Extended,
}

impl Grammar {
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Grammar::Simple => SIMPLE_KEYS,
            Grammar::Extended => EXTENDED_KEYS,
        }
    }
}

/// Resolve a URL with the [`Grammar::Extended`] key set.
pub fn resolve(uri: &str) -> ConfigResult<Resolution> {
    resolve_with(uri, Grammar::Extended)
}

/// Resolve a URL into a driver type and a driver configuration.
///
/// With [`Grammar::Extended`] the target may come from the path, from
/// `vm_name`, or from both. When both are given they must name the same
/// guest after decoding; a differing pair is rejected with
/// [`ConfigError::ConflictingConfig`] instead of letting one side win.
pub fn resolve_with(uri: &str, grammar: Grammar) -> ConfigResult<Resolution> {
    let parts = UriParts::split(uri);

    validate_scheme(parts.scheme)?;
    let driver_type = parse_hypervisor(parts.authority)?;
    let path_target = parse_path_target(parts.path)?;
    let pairs = parse_query(parts.query)?;

    let config = match grammar {
        Grammar::Simple => build_simple(path_target, pairs)?,
        Grammar::Extended => build_extended(path_target, pairs)?,
    };

    debug!(
        "Resolved {} ({:?} grammar): driver={:?} config={:?}",
        uri, grammar, driver_type, config
    );

    Ok(Resolution {
        driver_type,
        config,
    })
}

/// Raw URL components, borrowed from the input.
#[derive(Debug, PartialEq)]
struct UriParts<'a> {
    scheme: &'a str,
    authority: &'a str,
    path: &'a str,
    query: &'a str,
}

impl<'a> UriParts<'a> {
    fn split(uri: &'a str) -> Self {
        let (scheme, rest) = uri.split_once(':').unwrap_or(("", uri));
        // Fragments carry nothing for us.
        let rest = rest.split_once('#').map_or(rest, |(r, _)| r);
        let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));

        let (authority, path) = match rest.strip_prefix("//") {
            Some(after) => match after.find('/') {
                Some(i) => (&after[..i], &after[i..]),
                None => (after, ""),
            },
            None => ("", rest),
        };

        UriParts {
            scheme,
            authority,
            path,
            query,
        }
    }
}

fn validate_scheme(scheme: &str) -> ConfigResult<()> {
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return Err(ConfigError::SchemeMismatch {
            got: scheme.to_string(),
            expected: SCHEME,
        });
    }
    Ok(())
}

fn parse_hypervisor(authority: &str) -> ConfigResult<Option<DriverType>> {
    if authority.is_empty() {
        return Ok(None);
    }
    authority.parse().map(Some)
}

fn parse_path_target(path: &str) -> ConfigResult<Option<String>> {
    let raw = path.strip_prefix('/').unwrap_or(path);
    if raw.is_empty() {
        return Ok(None);
    }
    let decoded = urlencoding::decode(raw)
        .map_err(|e| ConfigError::MalformedQuery(format!("target {:?}: {}", raw, e)))?;
    Ok(Some(decoded.into_owned()))
}

/// Split a query string into decoded `(key, value)` pairs, in order.
///
/// Strict: every `&`-separated field must be `key=value` with a non-empty
/// value.
fn parse_query(query: &str) -> ConfigResult<Vec<(String, String)>> {
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let mut pairs = Vec::new();
    for field in query.split('&') {
        if field.is_empty() {
            return Err(ConfigError::MalformedQuery("empty query field".into()));
        }
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedQuery(format!("bad query field: {:?}", field)))?;
        let key = form_decode(key)?;
        let value = form_decode(value)?;
        if value.is_empty() {
            return Err(ConfigError::MalformedQuery(format!(
                "empty value for key {:?}",
                key
            )));
        }
        pairs.push((key, value));
    }
    Ok(pairs)
}

/// Decode an `application/x-www-form-urlencoded` component.
fn form_decode(component: &str) -> ConfigResult<String> {
    let plus_decoded: Cow<'_, str> = if component.contains('+') {
        Cow::Owned(component.replace('+', " "))
    } else {
        Cow::Borrowed(component)
    };
    urlencoding::decode(&plus_decoded)
        .map(Cow::into_owned)
        .map_err(|e| ConfigError::MalformedQuery(format!("{:?}: {}", component, e)))
}

fn build_simple(
    path_target: Option<String>,
    pairs: Vec<(String, String)>,
) -> ConfigResult<DriverConfig> {
    let target = path_target.ok_or(ConfigError::EmptyTarget)?;
    let mut config = DriverConfig::new(target);

    let mut seen: Option<String> = None;
    for (key, value) in pairs {
        if !SIMPLE_KEYS.contains(&key.as_str()) {
            return Err(ConfigError::UnknownConfigKey {
                key,
                valid: SIMPLE_KEYS.to_vec(),
            });
        }
        if let Some(prev) = &seen {
            return Err(ConfigError::ConflictingConfig(format!(
                "only one driver initialization parameter is supported, got {} and {}",
                prev, key
            )));
        }
        config.backend = BackendConfig::KvmSocket { unix_socket: value };
        seen = Some(key);
    }

    Ok(config)
}

fn build_extended(
    path_target: Option<String>,
    pairs: Vec<(String, String)>,
) -> ConfigResult<DriverConfig> {
    let mut vm_name: Option<String> = None;
    let mut backend = BackendConfig::None;

    for (key, value) in pairs {
        match key.as_str() {
            "vm_name" => {
                if vm_name.is_some() {
                    return Err(ConfigError::ConflictingConfig("duplicate vm_name".into()));
                }
                vm_name = Some(value);
            }
            "kvm_unix_socket" => {
                set_backend(&mut backend, &key, BackendConfig::KvmSocket { unix_socket: value })?;
            }
            "memflow_connector_name" => {
                set_backend(
                    &mut backend,
                    &key,
                    BackendConfig::Connector {
                        name: value,
                        args: Vec::new(),
                    },
                )?;
            }
            "memflow_connector_args" => match &mut backend {
                BackendConfig::Connector { args, .. } => args.push(value),
                _ => {
                    return Err(ConfigError::ConflictingConfig(
                        "memflow connector args received but no connector name specified".into(),
                    ))
                }
            },
            _ => {
                return Err(ConfigError::UnknownConfigKey {
                    key,
                    valid: EXTENDED_KEYS.to_vec(),
                })
            }
        }
    }

    let target = match (path_target, vm_name) {
        (Some(path), Some(name)) if path != name => {
            return Err(ConfigError::ConflictingConfig(format!(
                "target {:?} in path conflicts with vm_name={:?}",
                path, name
            )))
        }
        (Some(path), _) => Some(path),
        (None, name) => name,
    };

    Ok(DriverConfig { target, backend })
}

fn set_backend(slot: &mut BackendConfig, key: &str, new: BackendConfig) -> ConfigResult<()> {
    if !slot.is_none() {
        return Err(ConfigError::ConflictingConfig(format!(
            "{} conflicts with the already configured {} backend",
            key,
            slot.kind()
        )));
    }
    *slot = new;
    Ok(())
}
