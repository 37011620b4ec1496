//! Lightweight query enrichment — pure text processing, no LLM.
//!
//! High-frequency content words from the recent conversation are appended
//! to the original query in brackets, improving recall without another
//! model round-trip. Stopword lists cover English and Chinese.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// Word pattern: word characters plus the CJK unified ideograph range,
/// two characters or more.
static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w\x{4e00}-\x{9fff}]{2,}").expect("valid word pattern"));

const EN_STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "shall", "can",
    "need", "must", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
    "them", "my", "your", "his", "its", "our", "their", "this", "that", "these", "those",
    "what", "which", "who", "whom", "and", "or", "but", "if", "then", "else", "when", "where",
    "how", "not", "no", "nor", "so", "too", "very", "just", "also", "in", "on", "at", "to",
    "for", "of", "with", "by", "from", "as", "into", "about", "between", "through", "after",
    "before", "up", "down", "out", "off", "over", "under", "again",
];

const ZH_STOPWORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "上", "也",
    "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这", "他",
    "她", "它", "们", "那", "些", "什么", "怎么", "如何", "可以", "但是", "因为", "所以",
    "如果", "虽然", "还是", "或者", "以及", "而且",
];

/// Extract candidate words from text with the shared word pattern.
pub(crate) fn extract_words(text: &str) -> Vec<String> {
    WORD_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// The outcome of a query rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    pub original: String,
    pub rewritten: String,
    pub keywords: Vec<String>,
}

/// Frequency-based keyword enrichment from recent conversation messages.
pub struct QueryRewriter {
    max_context_messages: usize,
    max_keywords: usize,
    min_word_length: usize,
    stopwords: HashSet<String>,
}

impl QueryRewriter {
    pub fn new() -> Self {
        let mut stopwords: HashSet<String> =
            EN_STOPWORDS.iter().map(|s| s.to_string()).collect();
        stopwords.extend(ZH_STOPWORDS.iter().map(|s| s.to_string()));
        Self {
            max_context_messages: 5,
            max_keywords: 6,
            min_word_length: 2,
            stopwords,
        }
    }

    pub fn with_max_context_messages(mut self, n: usize) -> Self {
        self.max_context_messages = n;
        self
    }

    pub fn with_max_keywords(mut self, n: usize) -> Self {
        self.max_keywords = n;
        self
    }

    pub fn with_extra_stopwords(mut self, words: &[&str]) -> Self {
        self.stopwords.extend(words.iter().map(|s| s.to_lowercase()));
        self
    }

    /// Enrich `query` with high-frequency words from the last N wire
    /// messages. Words already in the query and stopwords are skipped.
    pub fn rewrite(&self, query: &str, context_messages: &[serde_json::Value]) -> RewriteResult {
        if query.is_empty() || context_messages.is_empty() {
            return RewriteResult {
                original: query.to_string(),
                rewritten: query.to_string(),
                keywords: Vec::new(),
            };
        }

        let query_words: HashSet<String> = extract_words(query)
            .into_iter()
            .map(|w| w.to_lowercase())
            .collect();

        let start = context_messages
            .len()
            .saturating_sub(self.max_context_messages);
        let mut frequency: HashMap<String, usize> = HashMap::new();
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for message in &context_messages[start..] {
            let Some(content) = message.get("content").and_then(|c| c.as_str()) else {
                continue;
            };
            for word in extract_words(content) {
                let lower = word.to_lowercase();
                if lower.chars().count() < self.min_word_length
                    || self.stopwords.contains(&lower)
                    || query_words.contains(&lower)
                {
                    continue;
                }
                let next_index = first_seen.len();
                first_seen.entry(lower.clone()).or_insert(next_index);
                *frequency.entry(lower).or_insert(0) += 1;
            }
        }

        // Frequency descending; first-appearance order as the tie-break
        // keeps rewrites deterministic.
        let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(first_seen[&a.0].cmp(&first_seen[&b.0])));
        let keywords: Vec<String> = ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word)
            .collect();

        if keywords.is_empty() {
            return RewriteResult {
                original: query.to_string(),
                rewritten: query.to_string(),
                keywords,
            };
        }

        let rewritten = format!("{query} [{}]", keywords.join(" "));
        RewriteResult {
            original: query.to_string(),
            rewritten,
            keywords,
        }
    }
}

impl Default for QueryRewriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> serde_json::Value {
        serde_json::json!({"role": "user", "content": content})
    }

    #[test]
    fn empty_query_passes_through() {
        let rewriter = QueryRewriter::new();
        let result = rewriter.rewrite("", &[message("context words here")]);
        assert_eq!(result.rewritten, "");
        assert!(result.keywords.is_empty());
    }

    #[test]
    fn no_context_passes_through() {
        let rewriter = QueryRewriter::new();
        let result = rewriter.rewrite("original query", &[]);
        assert_eq!(result.rewritten, "original query");
    }

    #[test]
    fn frequent_words_appended_in_brackets() {
        let rewriter = QueryRewriter::new();
        let context = vec![
            message("the tokenizer counts tokenizer vocabularies"),
            message("tokenizer budgets matter"),
        ];
        let result = rewriter.rewrite("how does counting work", &context);
        assert!(result.rewritten.starts_with("how does counting work ["));
        assert_eq!(result.keywords[0], "tokenizer");
    }

    #[test]
    fn stopwords_and_query_words_excluded() {
        let rewriter = QueryRewriter::new();
        let context = vec![message("the the the and rust rust compiler")];
        let result = rewriter.rewrite("rust question", &context);
        // "the"/"and" are stopwords, "rust" is already in the query
        assert_eq!(result.keywords, vec!["compiler".to_string()]);
    }

    #[test]
    fn chinese_stopwords_filtered() {
        let rewriter = QueryRewriter::new();
        let context = vec![message("但是 内存 管理 内存 引擎")];
        let result = rewriter.rewrite("查询 系统", &context);
        assert!(result.keywords.contains(&"内存".to_string()));
        assert!(!result.keywords.contains(&"但是".to_string()));
    }

    #[test]
    fn keyword_count_capped() {
        let rewriter = QueryRewriter::new().with_max_keywords(2);
        let context = vec![message("alpha beta gamma delta epsilon zeta")];
        let result = rewriter.rewrite("query", &context);
        assert_eq!(result.keywords.len(), 2);
    }

    #[test]
    fn only_recent_messages_considered() {
        let rewriter = QueryRewriter::new().with_max_context_messages(1);
        let context = vec![message("ancient history words"), message("fresh topic")];
        let result = rewriter.rewrite("query", &context);
        assert!(result.keywords.contains(&"fresh".to_string()));
        assert!(!result.keywords.contains(&"ancient".to_string()));
    }

    #[test]
    fn rewrite_is_deterministic() {
        let rewriter = QueryRewriter::new();
        let context = vec![message("one two three four five six seven eight")];
        let a = rewriter.rewrite("query", &context);
        let b = rewriter.rewrite("query", &context);
        assert_eq!(a, b);
    }
}
