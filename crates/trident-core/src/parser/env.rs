use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Parse `.env`-style `KEY=VALUE` lines: blank lines and `#`-prefixed
/// comments are skipped, values may be wrapped in matching `"..."` or
/// `'...'` quotes (stripped on load), and a leading `export ` on a line is
/// tolerated and ignored.
fn parse_dotenv(data: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            &value[1..value.len() - 1]
        } else {
            value
        };
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}

/// Load a `.env` file (if present) and apply its variables to the current
/// process environment, without overriding variables already set. Returns
/// the parsed map regardless of whether any were applied.
pub fn load_dotenv(project_root: &Path) -> Result<BTreeMap<String, String>> {
    let path = project_root.join(".env");
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = std::fs::read_to_string(&path)?;
    let vars = parse_dotenv(&data);
    for (key, value) in &vars {
        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value);
        }
    }
    Ok(vars)
}
