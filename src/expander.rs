//! Turns catalog templates into concrete filesystem targets.
//!
//! Placeholders understood: `%VAR%`, `${VAR}`, `$VAR` and a leading `~`.
//! Backslashes are treated as separators on every platform so Windows-style
//! templates resolve wherever their variables are defined.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use glob::MatchOptions;
use regex::Regex;

use crate::error::ExpandError;
use crate::utils;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%([A-Za-z0-9_()]+)%|\$\{([A-Za-z0-9_()]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("placeholder regex is valid")
});

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct PathExpander {
    env: EnvLookup,
    home: Option<PathBuf>,
    high_priority: Vec<String>,
}

impl PathExpander {
    /// Expander reading the process environment.
    pub fn new(high_priority: &[String]) -> Self {
        Self {
            env: Box::new(|name| std::env::var(name).ok()),
            home: utils::home_dir(),
            high_priority: high_priority.iter().map(|p| normalize_key(p)).collect(),
        }
    }

    /// Replace the environment source, e.g. with a fixed map.
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(env);
        self
    }

    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    /// Substitute placeholders. Fails if any variable is unset.
    pub fn substitute(&self, template: &str) -> Result<String, ExpandError> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            let value = (self.env)(name)
                .or_else(|| (self.env)(&name.to_ascii_uppercase()))
                .ok_or_else(|| ExpandError::MissingVariable(name.to_string()))?;
            out.push_str(&template[last..whole.start]);
            out.push_str(&value);
            last = whole.end;
        }
        out.push_str(&template[last..]);

        if out == "~" || out.starts_with("~/") || out.starts_with("~\\") {
            let home = self.home.as_ref().ok_or(ExpandError::NoHomeDir)?;
            out = format!("{}{}", home.display(), &out[1..]);
        }

        if cfg!(not(windows)) {
            out = out.replace('\\', "/");
        }
        if out.is_empty() {
            return Err(ExpandError::MissingVariable(template.to_string()));
        }
        Ok(out)
    }

    /// Whether a template currently resolves to at least one existing entry.
    ///
    /// Wildcard templates need the directory above the first wildcard segment
    /// to exist; a malformed pattern then passes on that alone.
    pub fn exists(&self, template: &str) -> Result<bool, ExpandError> {
        let expanded = self.substitute(template)?;
        if !has_wildcard(&expanded) {
            return Ok(Path::new(&expanded).exists());
        }

        let Some(base) = wildcard_base(Path::new(&expanded)) else {
            return Ok(false);
        };
        if !base.is_dir() {
            return Ok(false);
        }
        match glob_matches(&expanded) {
            Ok(mut matches) => Ok(matches.any(|m| m.is_ok())),
            Err(err @ ExpandError::BadPattern { .. }) => {
                log::debug!("{err}, parent exists");
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Keep only the templates that resolve to something on disk.
    /// Templates that fail to expand are dropped.
    pub fn expand(&self, templates: &[String]) -> Vec<String> {
        templates
            .iter()
            .filter(|t| match self.exists(t) {
                Ok(found) => found,
                Err(err) => {
                    log::debug!("dropping template {t}: {err}");
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// Concrete entries a template currently names.
    pub fn try_resolve(&self, template: &str) -> Result<Vec<PathBuf>, ExpandError> {
        let expanded = self.substitute(template)?;
        if !has_wildcard(&expanded) {
            let path = PathBuf::from(expanded);
            return Ok(if path.exists() { vec![path] } else { Vec::new() });
        }
        Ok(glob_matches(&expanded)?.filter_map(Result::ok).collect())
    }

    /// [`try_resolve`](Self::try_resolve) with errors logged and mapped to nothing.
    pub fn resolve(&self, template: &str) -> Vec<PathBuf> {
        match self.try_resolve(template) {
            Ok(paths) => paths,
            Err(err @ ExpandError::BadPattern { .. }) => {
                log::warn!("template {template}: {err}");
                Vec::new()
            }
            Err(err) => {
                log::debug!("cannot resolve {template}: {err}");
                Vec::new()
            }
        }
    }

    /// Stable partition: high-value locations first, relative order kept.
    pub fn prioritize(&self, paths: Vec<String>) -> Vec<String> {
        let (mut high, normal): (Vec<_>, Vec<_>) = paths.into_iter().partition(|p| {
            let key = normalize_key(p);
            self.high_priority.iter().any(|h| !h.is_empty() && key.contains(h))
        });
        high.extend(normal);
        high
    }
}

fn normalize_key(s: &str) -> String {
    s.replace('%', "").replace('\\', "/").to_lowercase()
}

fn has_wildcard(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

/// Directory above the first path segment that contains a wildcard.
fn wildcard_base(path: &Path) -> Option<PathBuf> {
    let mut base = PathBuf::new();
    for component in path.components() {
        if let Component::Normal(seg) = component {
            if has_wildcard(&seg.to_string_lossy()) {
                return Some(base);
            }
        }
        base.push(component.as_os_str());
    }
    None
}

fn glob_matches(pattern: &str) -> Result<glob::Paths, ExpandError> {
    glob::glob_with(pattern, match_options()).map_err(|err| ExpandError::BadPattern {
        pattern: pattern.to_string(),
        reason: err.msg.to_string(),
    })
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: !cfg!(windows),
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn expander(vars: &[(&str, &str)], home: &Path) -> PathExpander {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PathExpander::new(&["%TEMP%".to_string(), "Chrome\\Cache".to_string()])
            .with_env(move |name| map.get(name).cloned())
            .with_home(Some(home.to_path_buf()))
    }

    #[test]
    fn substitutes_every_placeholder_style() {
        let e = expander(&[("ROOT", "/r"), ("SUB", "s")], Path::new("/home/u"));
        assert_eq!(e.substitute("%ROOT%/a").unwrap(), "/r/a");
        assert_eq!(e.substitute("${ROOT}/$SUB/x").unwrap(), "/r/s/x");
        assert_eq!(e.substitute("~/cache").unwrap(), "/home/u/cache");
        assert!(matches!(
            e.substitute("%NOPE%\\x"),
            Err(ExpandError::MissingVariable(v)) if v == "NOPE"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn backslashes_become_separators() {
        let e = expander(&[("LOCALAPPDATA", "/data")], Path::new("/h"));
        assert_eq!(e.substitute(r"%LOCALAPPDATA%\Temp").unwrap(), "/data/Temp");
    }

    #[test]
    fn expand_filters_to_existing_templates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("profiles/abc/cache2")).unwrap();
        std::fs::write(dir.path().join("a.log"), b"x").unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let e = expander(&[("ROOT", &root)], dir.path());

        let templates = vec![
            "%ROOT%/profiles/*/cache2".to_string(),
            "%ROOT%/missing".to_string(),
            "%ROOT%/*.log".to_string(),
            "%ROOT%/*.tmp".to_string(),
            "%ROOT%/nowhere/*/x".to_string(),
            "%UNSET%/anything".to_string(),
        ];
        assert_eq!(
            e.expand(&templates),
            vec!["%ROOT%/profiles/*/cache2", "%ROOT%/*.log"]
        );
        assert_eq!(
            e.resolve("%ROOT%/profiles/*/cache2"),
            vec![dir.path().join("profiles/abc/cache2")]
        );
    }

    #[test]
    fn malformed_pattern_passes_on_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let e = expander(&[("ROOT", &root)], dir.path());
        assert!(e.exists("%ROOT%/[*").unwrap());
        assert!(e.resolve("%ROOT%/[*").is_empty());
        assert!(matches!(
            e.try_resolve("%ROOT%/[*"),
            Err(ExpandError::BadPattern { pattern, .. }) if pattern.ends_with("[*")
        ));
    }

    #[test]
    fn prioritize_is_a_stable_partition() {
        let e = expander(&[], Path::new("/h"));
        let input = vec![
            "%APPDATA%\\one".to_string(),
            "%TEMP%\\x".to_string(),
            "%APPDATA%\\two".to_string(),
            "%LOCALAPPDATA%\\Google\\Chrome\\Cache".to_string(),
        ];
        let out = e.prioritize(input.clone());
        assert_eq!(
            out,
            vec![
                "%TEMP%\\x",
                "%LOCALAPPDATA%\\Google\\Chrome\\Cache",
                "%APPDATA%\\one",
                "%APPDATA%\\two",
            ]
        );
        assert_eq!(out.len(), input.len());
    }
}
