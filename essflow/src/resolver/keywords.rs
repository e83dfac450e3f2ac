//! Keyword scoring of job names.

use std::collections::BTreeSet;

/// Lowercases and keeps only ASCII letters and digits, so `AUTOINVOICE_CHILD`,
/// `AutoInvoice Child` and `autoinvoice-child` compare equal.
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// File stem of a report path: `/a/b/MY_REPORT.xdo` gives `MY_REPORT`.
#[must_use]
pub fn report_stem(identifier: &str) -> &str {
    let name = identifier
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Scores job names against a keyword set and a target report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    target: Option<String>,
}

impl KeywordMatcher {
    /// Creates a matcher. Blank keywords are ignored and keywords equal
    /// after normalization count once.
    #[must_use]
    pub fn new<I, S>(keywords: I, target_report_identifier: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = keywords
            .into_iter()
            .map(|k| normalize(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        let target = Some(normalize(report_stem(target_report_identifier)))
            .filter(|t| !t.is_empty());
        Self {
            keywords: unique.into_iter().collect(),
            target,
        }
    }

    /// Number of keywords found in `job_name`, plus one when the name contains
    /// the target report's stem.
    #[must_use]
    pub fn score(&self, job_name: &str) -> u32 {
        let name = normalize(job_name);
        if name.is_empty() {
            return 0;
        }
        let hits = self.keywords.iter().filter(|k| name.contains(k.as_str())).count();
        let fragment = self
            .target
            .as_ref()
            .is_some_and(|t| name.contains(t.as_str()));
        u32::try_from(hits).unwrap_or(u32::MAX) + u32::from(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> KeywordMatcher {
        KeywordMatcher::new(
            ["autoinvoice", "child", "report", "execution", "generate"],
            "/Custom/Receivables/Reports/AUTOINVOICE_CHILD_ESS_JOB_REPORT.xdo",
        )
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("AutoInvoice Child-Report_1"), "autoinvoicechildreport1");
    }

    #[test]
    fn test_report_stem() {
        assert_eq!(report_stem("/Custom/Reports/MY_REPORT.xdo"), "MY_REPORT");
        assert_eq!(report_stem("MY_REPORT"), "MY_REPORT");
        assert_eq!(report_stem(""), "");
    }

    #[test]
    fn test_scores() {
        let m = matcher();
        assert_eq!(m.score("AUTOINVOICE_REPORT_CHILD"), 3);
        assert_eq!(m.score("AutoInvoice Execution Report"), 3);
        assert_eq!(m.score("UNRELATED"), 0);
        // Every keyword plus the exact report stem
        assert_eq!(m.score("AUTOINVOICE_CHILD_ESS_JOB_REPORT"), 4);
        assert_eq!(m.score(""), 0);
    }

    #[test]
    fn test_repeated_keywords_count_once() {
        let m = KeywordMatcher::new(["report", "child", "report"], "");
        assert_eq!(m.score("CHILD_REPORT"), 2);

        let spelled_differently = KeywordMatcher::new(["Report", "REPORT", "re-port"], "");
        assert_eq!(spelled_differently.score("Execution Report"), 1);
    }
}
