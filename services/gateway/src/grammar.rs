//! Grammar Interface
//!
//! Input components collect digits and ask a compiled grammar whether they
//! match. The grammar engine itself is external; only the four-way result
//! matters here.

use crate::error::GrammarError;

/// Outcome of matching collected input against a grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    /// Input is a prefix of something that could match
    Partial,
    /// Input matches but could still be extended
    Match { interpretation: Option<String> },
    /// Input matches and nothing longer could
    MatchEnd { interpretation: Option<String> },
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match { .. } | MatchResult::MatchEnd { .. })
    }

    pub fn interpretation(&self) -> Option<&str> {
        match self {
            MatchResult::Match { interpretation } | MatchResult::MatchEnd { interpretation } => {
                interpretation.as_deref()
            }
            _ => None,
        }
    }
}

/// A compiled grammar
pub trait Matcher: Send {
    fn matches(&self, input: &str) -> MatchResult;
}

/// External grammar compiler
pub trait Grammar: Send + Sync {
    fn compile(&self, text: &str) -> Result<Box<dyn Matcher>, GrammarError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_result_helpers() {
        let full = MatchResult::MatchEnd {
            interpretation: Some("yes".into()),
        };
        assert!(full.is_match());
        assert_eq!(full.interpretation(), Some("yes"));
        assert!(!MatchResult::Partial.is_match());
        assert_eq!(MatchResult::NoMatch.interpretation(), None);
    }
}
