//! TF-IDF vectors and cosine similarity over short query strings.

use std::collections::HashMap;

const STOPWORDS: &[&str] = &["的", "是", "在", "与", "和", "及"];

/// Sparse, L2-normalized term weights.
pub type TermVector = HashMap<String, f64>;

fn terms(text: &str) -> Vec<String> {
    super::parse::tokenize(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Fit TF-IDF weights over `docs` and return one vector per document.
///
/// Uses raw term counts and smoothed idf, `ln((1 + n) / (1 + df)) + 1`.
pub fn tfidf_vectors(docs: &[&str]) -> Vec<TermVector> {
    let tokenized: Vec<Vec<String>> = docs.iter().map(|d| terms(d)).collect();
    let n = tokenized.len() as f64;

    let mut df: HashMap<&str, usize> = HashMap::new();
    for doc in &tokenized {
        let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *df.entry(term).or_default() += 1;
        }
    }

    tokenized
        .iter()
        .map(|doc| {
            let mut v: TermVector = HashMap::new();
            for term in doc {
                *v.entry(term.clone()).or_default() += 1.0;
            }
            for (term, weight) in v.iter_mut() {
                let d = df.get(term.as_str()).copied().unwrap_or(0) as f64;
                *weight *= ((1.0 + n) / (1.0 + d)).ln() + 1.0;
            }
            let norm = v.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                v.values_mut().for_each(|w| *w /= norm);
            }
            v
        })
        .collect()
}

/// Cosine similarity of two normalized vectors. Zero if either is empty.
pub fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|x| w * x))
        .sum()
}

/// Similarity of `query` to each of `corpus`, in corpus order.
pub fn similarities(query: &str, corpus: &[&str]) -> Vec<f64> {
    let mut docs = Vec::with_capacity(corpus.len() + 1);
    docs.extend_from_slice(corpus);
    docs.push(query);
    let vectors = tfidf_vectors(&docs);
    let Some((q, rest)) = vectors.split_last() else {
        return Vec::new();
    };
    rest.iter().map(|v| cosine(q, v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_is_fully_similar() {
        let sims = similarities("path between A and B", &["path between A and B"]);
        assert!((sims[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_text_is_dissimilar() {
        let sims = similarities("glucose", &["path between sun and star"]);
        assert_eq!(sims, vec![0.0]);
    }

    #[test]
    fn shared_terms_rank_higher() {
        let sims = similarities(
            "neighbors of photosynthesis",
            &["neighbors of glucose", "photosynthesis neighbors of chlorophyll", "weather"],
        );
        assert!(sims[1] > sims[0]);
        assert!(sims[0] > sims[2]);
    }

    #[test]
    fn empty_corpus_yields_nothing() {
        assert!(similarities("anything", &[]).is_empty());
    }

    #[test]
    fn vectors_are_normalized() {
        let vs = tfidf_vectors(&["a b b c", "c d"]);
        for v in vs {
            let norm: f64 = v.values().map(|w| w * w).sum();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }
}
