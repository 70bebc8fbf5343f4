//! Keyword-based query classification and mention extraction.
//!
//! No language understanding: query type comes from keyword tables
//! (English and Chinese phrasing) and entity mentions from matching query
//! tokens against node ids and names.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::KnowledgeGraph;

/// Structural query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Path,
    Neighbors,
    Subgraph,
    General,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Neighbors => "neighbors",
            Self::Subgraph => "subgraph",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const PATH_KEYWORDS: &[&str] = &[
    "path", "paths", "between", "relation", "relationship", "connect", "connected", "connects",
    "link", "linked", "links",
    "路径", "关系", "联系", "之间", "如何联系",
];

const NEIGHBOR_KEYWORDS: &[&str] = &[
    "neighbor", "neighbors", "neighbour", "neighbours", "around", "nearby", "adjacent",
    "related", "similar", "相关", "相邻", "周围", "附近", "相似", "类似",
];

const SUBGRAPH_KEYWORDS: &[&str] = &[
    "subgraph", "region", "area", "scope", "domain", "local", "子图", "局部", "区域", "范围",
    "领域",
];

/// Relation type → phrases that mention it.
pub const RELATION_KEYWORDS: &[(&str, &[&str])] = &[
    ("is_a", &["is a", "type of", "kind of", "是", "属于", "类型是", "分类为"]),
    ("part_of", &["part of", "component of", "包含", "组成部分", "构成"]),
    ("related_to", &["related to", "associated with", "关联", "连接", "链接"]),
    ("causes", &["causes", "leads to", "results in", "导致", "引起", "造成", "产生"]),
    ("used_for", &["used for", "用于", "用途是", "应用于", "服务于"]),
    ("located_in", &["located in", "situated in", "位于", "处于", "坐落于"]),
    ("time_of", &["happened at", "occurs during", "发生于", "时间是", "日期是", "期间"]),
    ("has_property", &["property of", "characteristic of", "特征是", "属性是", "特点是", "性质是"]),
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "to", "in", "on", "at", "for", "with", "from", "by",
    "is", "are", "was", "be", "what", "which", "who", "how", "find", "show", "list", "get",
    "me", "all", "about", "tell", "give", "any", "there", "does", "do", "that", "this",
    "的", "和", "与", "在", "是", "及",
];

/// Minimum token length (in chars) for substring matching.
const MIN_SUBSTRING_LEN: usize = 3;

fn contains_any(text: &str, keywords: &[&str], tokens: &HashSet<String>) -> bool {
    keywords.iter().any(|k| {
        if k.is_ascii() {
            tokens.contains(*k)
        } else {
            text.contains(k)
        }
    })
}

/// Split on whitespace and punctuation, lowercased.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || is_separator(c))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn is_separator(c: char) -> bool {
    (c.is_ascii_punctuation() && c != '_' && c != '-')
        || matches!(c, '，' | '。' | '！' | '？' | '、' | '；' | '：')
}

/// Classify by keyword tables. Precedence: subgraph > neighbors > path > general.
pub fn classify(text: &str) -> QueryType {
    let lower = text.to_lowercase();
    let tokens: HashSet<String> = tokenize(&lower).into_iter().collect();
    if contains_any(&lower, SUBGRAPH_KEYWORDS, &tokens) {
        QueryType::Subgraph
    } else if contains_any(&lower, NEIGHBOR_KEYWORDS, &tokens) {
        QueryType::Neighbors
    } else if contains_any(&lower, PATH_KEYWORDS, &tokens) {
        QueryType::Path
    } else {
        QueryType::General
    }
}

/// Relation types whose phrases occur in the query, in table order.
pub fn relation_mentions(text: &str) -> Vec<String> {
    let lower = format!(" {} ", tokenize(text).join(" "));
    let raw = text.to_lowercase();
    RELATION_KEYWORDS
        .iter()
        .filter(|(_, phrases)| {
            phrases.iter().any(|p| {
                if p.is_ascii() {
                    lower.contains(&format!(" {p} "))
                } else {
                    raw.contains(p)
                }
            })
        })
        .map(|(ty, _)| ty.to_string())
        .collect()
}

/// One entity reference in the query and the nodes it may denote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    /// Surface text as it appeared (lowercased).
    pub text: String,
    /// Matching node ids. Empty when nothing matched.
    pub candidates: Vec<String>,
}

impl Mention {
    pub fn is_resolved(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// Classification plus extracted mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub query_type: QueryType,
    pub mentions: Vec<Mention>,
    pub relation_types: Vec<String>,
}

impl ParsedQuery {
    pub fn resolved(&self) -> impl Iterator<Item = &Mention> {
        self.mentions.iter().filter(|m| m.is_resolved())
    }

    /// Fraction of mentions that matched at least one node. Zero without mentions.
    pub fn coverage(&self) -> f64 {
        if self.mentions.is_empty() {
            return 0.0;
        }
        self.resolved().count() as f64 / self.mentions.len() as f64
    }

    /// Union of all candidates, first-seen order.
    pub fn matched_nodes(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.resolved()
            .flat_map(|m| m.candidates.iter())
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    /// Surface text of each mention.
    pub fn mention_texts(&self) -> Vec<String> {
        self.mentions.iter().map(|m| m.text.clone()).collect()
    }
}

fn is_keyword(token: &str) -> bool {
    STOPWORDS.contains(&token)
        || PATH_KEYWORDS.contains(&token)
        || NEIGHBOR_KEYWORDS.contains(&token)
        || SUBGRAPH_KEYWORDS.contains(&token)
        || RELATION_KEYWORDS
            .iter()
            .any(|(_, phrases)| phrases.iter().any(|p| p.split(' ').any(|w| w == token)))
}

/// Byte offset of each token in `lower`, scanning left to right.
fn locate(lower: &str, tokens: &[String]) -> Vec<usize> {
    let mut from = 0usize;
    tokens
        .iter()
        .map(|t| match lower.get(from..).and_then(|rest| rest.find(t.as_str())) {
            Some(p) => {
                let pos = from + p;
                from = pos + t.len();
                pos
            }
            None => from,
        })
        .collect()
}

/// Parse a query against a graph.
///
/// Mentions are found in three passes:
/// 1. tokens equal to a node id or name (case-insensitive);
/// 2. multi-word or non-ASCII names occurring verbatim in the query;
/// 3. remaining meaningful ASCII tokens of at least three chars, matched
///    as substrings of node ids and names.
///
/// Mentions are ordered by where they occur in the query.
pub fn parse(text: &str, kg: &KnowledgeGraph) -> ParsedQuery {
    let lower = text.to_lowercase();
    let tokens = tokenize(text);
    let entities = kg.entities();
    let keys: Vec<(String, String, String)> = entities
        .iter()
        .map(|e| (e.id.clone(), e.id.to_lowercase(), e.name.to_lowercase()))
        .collect();

    // (position in query, mention)
    let mut found: Vec<(usize, Mention)> = Vec::new();
    let mut claimed: HashSet<String> = HashSet::new();
    let positions = locate(&lower, &tokens);

    for (token, &pos) in tokens.iter().zip(&positions) {
        let exact: Vec<String> = keys
            .iter()
            .filter(|(_, id, name)| id == token || name == token)
            .map(|(id, _, _)| id.clone())
            .collect();
        if !exact.is_empty() && claimed.insert(token.clone()) {
            found.push((pos, Mention { text: token.clone(), candidates: exact }));
        }
    }

    for (id, _, name) in &keys {
        let is_phrase = name.contains(char::is_whitespace) || !name.is_ascii();
        if !is_phrase || claimed.contains(name) {
            continue;
        }
        if let Some(pos) = lower.find(name.as_str()) {
            let end = pos + name.len();
            // The phrase subsumes any single-token match inside it.
            found.retain(|(p, _)| *p < pos || *p >= end);
            claimed.insert(name.clone());
            found.push((pos, Mention { text: name.clone(), candidates: vec![id.clone()] }));
        }
    }

    let covered: Vec<(usize, usize)> =
        found.iter().map(|(pos, m)| (*pos, pos + m.text.len())).collect();
    for (token, &pos) in tokens.iter().zip(&positions) {
        if claimed.contains(token)
            || !token.is_ascii()
            || is_keyword(token)
            || token.chars().count() < MIN_SUBSTRING_LEN
            || covered.iter().any(|&(s, e)| pos >= s && pos < e)
        {
            continue;
        }
        let candidates: Vec<String> = keys
            .iter()
            .filter(|(_, id, name)| id.contains(token.as_str()) || name.contains(token.as_str()))
            .map(|(id, _, _)| id.clone())
            .collect();
        claimed.insert(token.clone());
        found.push((pos, Mention { text: token.clone(), candidates }));
    }

    found.sort_by_key(|(pos, _)| *pos);
    ParsedQuery {
        query_type: classify(text),
        mentions: found.into_iter().map(|(_, m)| m).collect(),
        relation_types: relation_mentions(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, Relation};

    fn graph() -> KnowledgeGraph {
        let kg = KnowledgeGraph::new();
        let e = |id: &str, name: &str| Entity::new(id, name, "concept");
        for (s, t) in [
            (e("A", "Alpha"), e("B", "Beta")),
            (e("sun", "The Sun"), e("star", "Star")),
            (e("photosynthesis", "Photosynthesis"), e("glucose", "Glucose")),
        ] {
            kg.add_relation(&Relation::new(s, t, "related_to", 0.8).unwrap()).unwrap();
        }
        kg
    }

    #[test]
    fn classification_precedence() {
        assert_eq!(classify("path between A and B"), QueryType::Path);
        assert_eq!(classify("relation between A and B"), QueryType::Path);
        assert_eq!(classify("neighbors of A on the path"), QueryType::Neighbors);
        assert_eq!(classify("subgraph of related things"), QueryType::Subgraph);
        assert_eq!(classify("Alpha"), QueryType::General);
        assert_eq!(classify("A 和 B 之间的路径"), QueryType::Path);
        assert_eq!(classify("A 周围的节点"), QueryType::Neighbors);
        assert_eq!(classify("提取 A 的子图"), QueryType::Subgraph);
    }

    #[test]
    fn keywords_match_whole_tokens_only() {
        // "pathway" is not "path".
        assert_eq!(classify("pathway enzymes"), QueryType::General);
    }

    #[test]
    fn exact_tokens_resolve_in_order() {
        let parsed = parse("relation between A and B", &graph());
        assert_eq!(parsed.mentions.len(), 2);
        assert_eq!(parsed.mentions[0].candidates, vec!["A".to_string()]);
        assert_eq!(parsed.mentions[1].candidates, vec!["B".to_string()]);
        assert!((parsed.coverage() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn names_and_phrases_resolve() {
        let parsed = parse("path from Alpha to the sun", &graph());
        let ids: Vec<_> = parsed.matched_nodes();
        assert_eq!(ids, vec!["A".to_string(), "sun".to_string()]);

        let parsed = parse("how is The Sun linked to Beta", &graph());
        assert_eq!(parsed.mentions[0].text, "the sun");
        assert_eq!(parsed.mentions[0].candidates, vec!["sun".to_string()]);
        assert_eq!(parsed.mentions[1].candidates, vec!["B".to_string()]);
    }

    #[test]
    fn substring_candidates_and_unresolved_mentions() {
        let parsed = parse("neighbors of photo and zebra", &graph());
        assert_eq!(parsed.query_type, QueryType::Neighbors);
        assert_eq!(parsed.mentions.len(), 2);
        assert_eq!(parsed.mentions[0].candidates, vec!["photosynthesis".to_string()]);
        assert!(!parsed.mentions[1].is_resolved());
        assert!((parsed.coverage() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn relation_phrases_are_detected() {
        assert_eq!(relation_mentions("what causes rain"), vec!["causes".to_string()]);
        assert_eq!(
            relation_mentions("wheel is part of car"),
            vec!["part_of".to_string()]
        );
        assert!(relation_mentions("partial of").is_empty());
        assert_eq!(relation_mentions("北京位于中国"), vec!["located_in".to_string()]);
    }
}
