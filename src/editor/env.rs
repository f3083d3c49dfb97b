//! Editor process environment.
//!
//! Host environment minus reserved prefixes, overlaid with the runtime
//! config `env` (with `$VAR`/`${VAR}` expansion against the filtered host
//! environment), plus the local endpoint address.

use std::collections::BTreeMap;

const RESERVED_PREFIXES: [&str; 2] = ["OPENCODER", "KUBERNETES"];

pub fn is_blacklisted(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    RESERVED_PREFIXES.iter().any(|prefix| upper.starts_with(prefix))
}

pub fn build_env<I>(
    host: I,
    overrides: &BTreeMap<String, String>,
    supervisor_addr: &str,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let filtered: BTreeMap<String, String> = host
        .into_iter()
        .filter(|(name, _)| !is_blacklisted(name))
        .collect();

    let mut env = filtered.clone();
    for (name, value) in overrides {
        if is_blacklisted(name) {
            continue;
        }
        env.insert(name.clone(), expand(value, |var| filtered.get(var).cloned()));
    }
    env.insert("SUPERVISOR_ADDR".to_string(), supervisor_addr.to_string());
    env
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Shell-style expansion. Unknown variables expand to the empty string; a
/// `$` not followed by a name is kept literally.
pub fn expand<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                out.push_str(&lookup(name).unwrap_or_default());
                rest = &braced[end + 1..];
                continue;
            }
            out.push('$');
            rest = after;
            continue;
        }

        let len = after.find(|c: char| !is_name_char(c)).unwrap_or(after.len());
        if len == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        out.push_str(&lookup(&after[..len]).unwrap_or_default());
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reserved_prefixes_are_dropped_case_insensitively() {
        assert!(is_blacklisted("OPENCODER_WORKSPACE_ID"));
        assert!(is_blacklisted("kubernetes_service_host"));
        assert!(!is_blacklisted("HOME"));
    }

    #[test]
    fn builds_child_environment() {
        let host = pairs(&[
            ("HOME", "/home/dev"),
            ("PATH", "/usr/bin"),
            ("OPENCODER_TOKEN", "secret"),
            ("KUBERNETES_PORT", "443"),
        ]);
        let mut overrides = BTreeMap::new();
        overrides.insert("GOPATH".to_string(), "${HOME}/go".to_string());
        overrides.insert("PATH".to_string(), "$HOME/bin:$PATH".to_string());
        overrides.insert("LEAK".to_string(), "${OPENCODER_TOKEN}".to_string());
        overrides.insert("OPENCODER_X".to_string(), "nope".to_string());

        let env = build_env(host, &overrides, "localhost:22999");
        let expected: BTreeMap<String, String> = pairs(&[
            ("GOPATH", "/home/dev/go"),
            ("HOME", "/home/dev"),
            ("LEAK", ""),
            ("PATH", "/home/dev/bin:/usr/bin"),
            ("SUPERVISOR_ADDR", "localhost:22999"),
        ])
        .into_iter()
        .collect();
        assert_eq!(env, expected);
    }

    #[test]
    fn expansion_edge_cases() {
        let lookup = |name: &str| (name == "A").then(|| "x".to_string());
        assert_eq!(expand("$A-$B-${A}", lookup), "x--x");
        assert_eq!(expand("cost: 5$", lookup), "cost: 5$");
        assert_eq!(expand("${A", lookup), "${A");
        assert_eq!(expand("$$A", lookup), "$x");
    }
}
