// Keyword relevance filtering. Applied per item; never looks at siblings.

/// Case-insensitive keyword inclusion test over configured terms.
pub struct RelevanceFilter {
    keywords_lower: Vec<String>,
    always_include_author: bool,
}

impl RelevanceFilter {
    pub fn new(keywords: &[String], always_include_author: bool) -> Self {
        Self {
            keywords_lower: keywords.iter().map(|k| k.to_lowercase()).collect(),
            always_include_author,
        }
    }

    /// True if any configured keyword appears in the text as a substring.
    pub fn is_relevant(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        self.keywords_lower.iter().any(|k| text_lower.contains(k))
    }

    /// Relevance for a comment: post-author replies are always kept (they
    /// carry the conversation context), everything else needs a keyword hit.
    pub fn keep_comment(&self, body: &str, is_submitter: bool) -> bool {
        if self.always_include_author && is_submitter {
            return true;
        }
        self.is_relevant(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> RelevanceFilter {
        RelevanceFilter::new(
            &["Supio".to_string(), "document review".to_string()],
            true,
        )
    }

    #[test]
    fn matches_keyword_case_insensitively() {
        let f = filter();
        assert!(f.is_relevant("Has anyone tried SUPIO for intake?"));
        assert!(f.is_relevant("we outsource document review"));
        assert!(!f.is_relevant("completely unrelated discussion"));
    }

    #[test]
    fn keyword_matches_as_substring() {
        assert!(filter().is_relevant("supio-adjacent tooling"));
    }

    #[test]
    fn author_reply_kept_without_keyword() {
        let f = filter();
        assert!(f.keep_comment("thanks, that helps", true));
        assert!(!f.keep_comment("thanks, that helps", false));
    }

    #[test]
    fn author_override_can_be_disabled() {
        let f = RelevanceFilter::new(&["Supio".to_string()], false);
        assert!(!f.keep_comment("thanks, that helps", true));
    }
}
