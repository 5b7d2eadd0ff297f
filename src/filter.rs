//! Word filter
//!
//! Decides whether a note may be learned from. Rules come from local files
//! and an optional remote list, one rule per line:
//!
//! - blank lines and lines starting with `#` are ignored
//! - `/pattern/` is a regular expression
//! - anything else is a case-insensitive substring
//!
//! A source that fails to load is logged and skipped.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;

/// A single filter rule
#[derive(Debug, Clone)]
pub enum FilterRule {
    /// Lowercased substring
    Term(String),
    Pattern(Regex),
}

impl FilterRule {
    /// Parse one line; None for blank lines and comments
    pub fn parse(line: &str) -> Option<Result<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        if line.len() > 2 && line.starts_with('/') && line.ends_with('/') {
            let pattern = &line[1..line.len() - 1];
            return Some(
                Regex::new(pattern)
                    .map(FilterRule::Pattern)
                    .with_context(|| format!("Invalid filter pattern: {}", pattern)),
            );
        }
        Some(Ok(FilterRule::Term(line.to_lowercase())))
    }

    fn matches(&self, text: &str, lowered: &str) -> bool {
        match self {
            FilterRule::Term(term) => lowered.contains(term.as_str()),
            FilterRule::Pattern(regex) => regex.is_match(text),
        }
    }
}

/// Upper bound on fetching the remote list
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WordFilter {
    files: Vec<PathBuf>,
    url: Option<String>,
    timeout: Duration,
    rules: Vec<FilterRule>,
}

impl WordFilter {
    pub fn new(files: Vec<PathBuf>, url: Option<String>) -> Self {
        Self {
            files,
            url: url.filter(|u| !u.is_empty()),
            timeout: FETCH_TIMEOUT,
            rules: Vec::new(),
        }
    }

    /// Override the remote fetch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.markov_speaking.word_filter_files.clone(),
            Some(config.markov_speaking.word_filter_url.clone()),
        )
    }

    /// Load every configured source, replacing previously loaded rules
    pub async fn init(&mut self) {
        let mut rules = Vec::new();

        for path in &self.files {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) => {
                    let before = rules.len();
                    parse_rules(&contents, &mut rules);
                    debug!("Loaded {} filter rules from {}", rules.len() - before, path.display());
                }
                Err(e) => warn!("Skipping word filter file {}: {}", path.display(), e),
            }
        }

        if let Some(url) = &self.url {
            match fetch(url, self.timeout).await {
                Ok(contents) => {
                    let before = rules.len();
                    parse_rules(&contents, &mut rules);
                    debug!("Loaded {} filter rules from {}", rules.len() - before, url);
                }
                Err(e) => warn!("Skipping word filter URL {}: {:#}", url, e),
            }
        }

        info!("Word filter initialized with {} rules", rules.len());
        self.rules = rules;
    }

    /// Whether the text matches any rule
    pub fn is_bad(&self, text: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.rules.iter().any(|rule| rule.matches(text, &lowered))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Configured sources, comma separated
    pub fn sources(&self) -> String {
        self.files
            .iter()
            .map(|p| p.display().to_string())
            .chain(self.url.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn parse_rules(contents: &str, rules: &mut Vec<FilterRule>) {
    for rule in contents.lines().filter_map(FilterRule::parse) {
        match rule {
            Ok(rule) => rules.push(rule),
            Err(e) => warn!("{:#}", e),
        }
    }
}

async fn fetch(url: &str, timeout: Duration) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to fetch word filter")?
        .error_for_status()
        .context("Word filter request failed")?;
    response.text().await.context("Failed to read word filter")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_with(rules: &str) -> WordFilter {
        let mut filter = WordFilter::new(vec![], None);
        parse_rules(rules, &mut filter.rules);
        filter
    }

    #[test]
    fn test_parse_skips_blank_and_comments() {
        assert!(FilterRule::parse("").is_none());
        assert!(FilterRule::parse("   ").is_none());
        assert!(FilterRule::parse("# comment").is_none());
        assert!(matches!(FilterRule::parse(" Spam "), Some(Ok(FilterRule::Term(t))) if t == "spam"));
        assert!(matches!(FilterRule::parse("/ab+c/"), Some(Ok(FilterRule::Pattern(_)))));
        assert!(matches!(FilterRule::parse("/(/"), Some(Err(_))));
    }

    #[test]
    fn test_terms_match_case_insensitively() {
        let filter = filter_with("badword\n");
        assert!(filter.is_bad("this has a BadWord in it"));
        assert!(!filter.is_bad("perfectly fine"));
    }

    #[test]
    fn test_patterns() {
        let filter = filter_with("/^https?://\\S+$/\n/\\d{3}-\\d{4}/");
        assert!(filter.is_bad("https://spam.example"));
        assert!(filter.is_bad("call 555-1234 now"));
        assert!(!filter.is_bad("see https://x.example for details"));
    }

    #[test]
    fn test_invalid_pattern_does_not_drop_other_rules() {
        let filter = filter_with("/(/\nspam");
        assert_eq!(filter.rule_count(), 1);
        assert!(filter.is_bad("spam spam"));
    }

    #[test]
    fn test_empty_filter_allows_everything() {
        let filter = WordFilter::new(vec![], None);
        assert!(!filter.is_bad("anything"));
    }

    #[test]
    fn test_init_skips_failing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("words.txt");
        std::fs::write(&good, "# list\nbadword\n/sp[a@]m/\n").unwrap();
        let missing = dir.path().join("missing.txt");

        let mut filter = WordFilter::new(
            vec![missing, good],
            Some("http://127.0.0.1:9/unreachable.txt".to_string()),
        );
        tokio_test::block_on(filter.init());

        assert_eq!(filter.rule_count(), 2);
        assert!(filter.is_bad("sp@m"));
        assert!(filter.is_bad("BADWORD"));
    }

    #[tokio::test]
    async fn test_init_gives_up_on_unresponsive_url() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let words = dir.path().join("words.txt");
        std::fs::write(&words, "badword\n").unwrap();

        let mut filter = WordFilter::new(vec![words], Some(format!("http://{}/ng.txt", addr)))
            .with_timeout(Duration::from_millis(200));
        tokio::time::timeout(Duration::from_secs(10), filter.init())
            .await
            .expect("init should not hang on a silent server");

        assert_eq!(filter.rule_count(), 1);
        assert!(filter.is_bad("BADWORD"));
        server.abort();
    }

    #[test]
    fn test_sources() {
        let filter = WordFilter::new(
            vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
            Some("https://example.com/list".to_string()),
        );
        assert_eq!(filter.sources(), "a.txt,b.txt,https://example.com/list");

        let filter = WordFilter::new(vec![PathBuf::from("a.txt")], Some(String::new()));
        assert_eq!(filter.sources(), "a.txt");
    }
}
