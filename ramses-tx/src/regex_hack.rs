//! Per-frame regex rewriting, applied transparently at the transport layer
//! (spec.md's supplemented `use_regex` feature, grounded on
//! `transport.py`'s `_RegexHackMixin`).

use regex::Regex;
use tracing::warn;

/// One direction's ordered set of `(pattern, replacement)` rules, compiled
/// once at construction so a malformed pattern is reported up front rather
/// than on every frame.
#[derive(Debug, Default, Clone)]
pub struct RegexPipeline {
    inbound: Vec<(Regex, String)>,
    outbound: Vec<(Regex, String)>,
}

impl RegexPipeline {
    /// Build a pipeline from `{pattern: replacement}` maps. Rules whose
    /// pattern fails to compile are skipped with a warning rather than
    /// rejecting the whole config.
    pub fn new<I, O>(inbound: I, outbound: O) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
        O: IntoIterator<Item = (String, String)>,
    {
        RegexPipeline { inbound: compile(inbound), outbound: compile(outbound) }
    }

    pub fn apply_inbound(&self, line: &str) -> String {
        apply(&self.inbound, line)
    }

    pub fn apply_outbound(&self, line: &str) -> String {
        apply(&self.outbound, line)
    }
}

fn compile(rules: impl IntoIterator<Item = (String, String)>) -> Vec<(Regex, String)> {
    rules
        .into_iter()
        .filter_map(|(pattern, replacement)| match Regex::new(&pattern) {
            Ok(re) => Some((re, replacement)),
            Err(e) => {
                warn!(%pattern, %e, "use_regex: ignoring rule with invalid pattern");
                None
            }
        })
        .collect()
}

fn apply(rules: &[(Regex, String)], line: &str) -> String {
    let mut result = line.to_string();
    for (pattern, replacement) in rules {
        let rewritten = pattern.replace_all(&result, replacement.as_str());
        if rewritten != result {
            warn!(before = %result, after = %rewritten, "use_regex: frame changed");
        }
        result = rewritten.into_owned();
    }
    result
}
