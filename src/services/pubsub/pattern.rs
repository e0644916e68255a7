use regex::Regex;

use crate::error::{IpcError, Result};

/// Glob channel pattern: `*` matches any run of characters, `?` exactly one.
#[derive(Debug, Clone)]
pub struct ChannelPattern {
    source: String,
    re: Regex,
}

impl ChannelPattern {
    pub fn new(glob: &str) -> Result<Self> {
        let mut expr = String::with_capacity(glob.len() + 8);
        expr.push('^');
        for ch in glob.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
            }
        }
        expr.push('$');
        let re = Regex::new(&expr).map_err(|e| IpcError::Config(e.to_string()))?;
        Ok(Self {
            source: glob.to_string(),
            re,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, channel: &str) -> bool {
        self.re.is_match(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        let p = ChannelPattern::new("mewld/ipc@*").unwrap();
        assert!(p.matches("mewld/ipc@3"));
        assert!(p.matches("mewld/ipc@jobserver"));
        assert!(p.matches("mewld/ipc@"));
        assert!(!p.matches("mewld"));
        assert!(!p.matches("other/ipc@3"));

        let p = ChannelPattern::new("a.b?").unwrap();
        assert!(p.matches("a.bc"));
        assert!(!p.matches("axbc"));
        assert!(!p.matches("a.b"));
        assert_eq!(p.as_str(), "a.b?");
    }
}
