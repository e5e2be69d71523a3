//! Fixture matcher: an ordered (name, compiled regex,
//! target path) list, first-match-wins, falling back to a configured
//! default path and finally to `responses/chat/generic.yaml`.

use regex::Regex;

pub struct MatchRule {
    pub name: String,
    pub regex: Regex,
    pub target_path: String,
    /// Explicit priority, honored when present; ties broken by
    /// insertion order.
    pub priority: Option<i32>,
}

pub struct Matcher {
    rules: Vec<MatchRule>,
    default_path: String,
}

pub const FALLBACK_PATH: &str = "responses/chat/generic.yaml";

impl Matcher {
    pub fn new(default_path: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_path: default_path.into(),
        }
    }

    pub fn add_rule(&mut self, name: impl Into<String>, pattern: &str, target_path: impl Into<String>, priority: Option<i32>) -> Result<(), regex::Error> {
        let regex = Regex::new(pattern)?;
        self.rules.push(MatchRule {
            name: name.into(),
            regex,
            target_path: target_path.into(),
            priority,
        });
        Ok(())
    }

    /// Evaluates `text` against the configured rules in priority order
    /// (explicit priority first, highest first; insertion order for
    /// ties or when no priority is set), returning the first match's
    /// target path, the configured default, or the hard-coded fallback.
    pub fn match_path(&self, text: &str) -> &str {
        let mut ordered: Vec<&MatchRule> = self.rules.iter().collect();
        ordered.sort_by(|a, b| b.priority.unwrap_or(0).cmp(&a.priority.unwrap_or(0)));

        for rule in ordered {
            if rule.regex.is_match(text) {
                return &rule.target_path;
            }
        }
        if !self.default_path.is_empty() {
            &self.default_path
        } else {
            FALLBACK_PATH
        }
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins_by_priority() {
        let mut matcher = Matcher::new("chat/default.yaml");
        matcher.add_rule("greeting", "(?i)hello", "chat/greeting.yaml", Some(1)).unwrap();
        matcher.add_rule("catchall", ".*", "chat/catchall.yaml", Some(0)).unwrap();
        assert_eq!(matcher.match_path("hello there"), "chat/greeting.yaml");
        assert_eq!(matcher.match_path("goodbye"), "chat/catchall.yaml");
    }

    #[test]
    fn falls_back_when_nothing_matches() {
        let mut matcher = Matcher::new("chat/default.yaml");
        matcher.add_rule("greeting", "(?i)hello", "chat/greeting.yaml", None).unwrap();
        assert_eq!(matcher.match_path("nothing relevant"), "chat/default.yaml");
    }

    #[test]
    fn falls_back_to_generic_when_no_default_configured() {
        let matcher = Matcher::new("");
        assert_eq!(matcher.match_path("anything"), FALLBACK_PATH);
    }
}
