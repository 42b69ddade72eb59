//! Variable substitution for catalog values
//!
//! Supported variables:
//! - `${role:NAME}` — network hostname of the container playing role NAME
//! - `${instance}` — short id of the running instance
//! - `${localEnv:VAR}` — host environment variable
//! - `${localEnv:VAR:default}` — host environment variable with fallback
//!
//! Unknown variables are left untouched so container-side shells can still
//! expand them.

use std::collections::{BTreeMap, HashMap};

/// Context for variable substitution
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    pub instance: String,
    /// Role name to container hostname
    pub hosts: HashMap<String, String>,
}

impl SubstitutionContext {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            hosts: HashMap::new(),
        }
    }

    pub fn with_host(mut self, role: impl Into<String>, host: impl Into<String>) -> Self {
        self.hosts.insert(role.into(), host.into());
        self
    }
}

/// Substitute variables in a string
pub fn substitute(input: &str, ctx: &SubstitutionContext) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for nc in chars.by_ref() {
                if nc == '}' {
                    closed = true;
                    break;
                }
                var_name.push(nc);
            }
            if closed {
                result.push_str(&resolve_variable(&var_name, ctx));
            } else {
                result.push_str("${");
                result.push_str(&var_name);
            }
        } else {
            result.push(c);
        }
    }

    result
}

fn resolve_variable(var: &str, ctx: &SubstitutionContext) -> String {
    match var {
        "instance" => ctx.instance.clone(),
        _ if var.starts_with("role:") => match ctx.hosts.get(&var["role:".len()..]) {
            Some(host) => host.clone(),
            None => {
                tracing::warn!("Unknown role in ${{{}}}", var);
                format!("${{{}}}", var)
            }
        },
        _ if var.starts_with("localEnv:") => {
            let rest = &var["localEnv:".len()..];
            if let Some((name, default)) = rest.split_once(':') {
                std::env::var(name).unwrap_or_else(|_| default.to_string())
            } else {
                std::env::var(rest).unwrap_or_default()
            }
        }
        _ => format!("${{{}}}", var),
    }
}

/// Substitute variables in a vec of strings
pub fn substitute_vec(input: &[String], ctx: &SubstitutionContext) -> Vec<String> {
    input.iter().map(|s| substitute(s, ctx)).collect()
}

/// Substitute variables in a map's values
pub fn substitute_map(
    input: &BTreeMap<String, String>,
    ctx: &SubstitutionContext,
) -> HashMap<String, String> {
    input
        .iter()
        .map(|(k, v)| (k.clone(), substitute(v, ctx)))
        .collect()
}
