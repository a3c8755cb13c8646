//! TF-IDF term weighting over product name + description.
//!
//! Terms are lower-cased runs of at least two word characters with English
//! stop words removed; n-grams are formed from the surviving tokens. The
//! vocabulary is kept in alphabetical order so a term's position is its
//! column in the text block.

use crate::config::FeatureConfig;
use crate::utils::normalize_vector;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can",
    "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do",
    "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or",
    "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "part",
    "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together",
    "too", "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up",
    "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
    "whence", "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon",
    "wherever", "whether", "which", "while", "whither", "who", "whoever", "whole", "whom",
    "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    vocabulary: Vec<String>,
    idf: Vec<f32>,
    min_ngram: usize,
    max_ngram: usize,
}

impl TfIdfVectorizer {
    /// Fits vocabulary and smoothed IDF weights on `documents`.
    ///
    /// Terms below the minimum document frequency are pruned first, then the
    /// most frequent terms (by corpus count, ties alphabetical) are kept up to
    /// the configured cap. An empty vocabulary is valid and yields a
    /// zero-width text block.
    pub fn fit(documents: &[String], config: &FeatureConfig) -> Self {
        let min_ngram = config.min_ngram.max(1);
        let max_ngram = config.max_ngram.max(min_ngram);

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut term_count: HashMap<String, usize> = HashMap::new();

        for document in documents {
            let terms = analyze(document, min_ngram, max_ngram);
            let mut seen = HashSet::new();
            for term in terms {
                *term_count.entry(term.clone()).or_insert(0) += 1;
                if seen.insert(term.clone()) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        let mut kept: Vec<(String, usize)> = term_count
            .into_iter()
            .filter(|(term, _)| doc_freq.get(term).copied().unwrap_or(0) >= config.min_document_frequency)
            .collect();
        kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        kept.truncate(config.max_text_features);

        let mut vocabulary: Vec<String> = kept.into_iter().map(|(term, _)| term).collect();
        vocabulary.sort();

        let n = documents.len() as f32;
        let idf = vocabulary
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        Self {
            vocabulary,
            idf,
            min_ngram,
            max_ngram,
        }
    }

    /// L2-normalized TF-IDF weights of `document` over the fitted vocabulary.
    pub fn transform(&self, document: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        if vector.is_empty() {
            return vector;
        }

        for term in analyze(document, self.min_ngram, self.max_ngram) {
            if let Ok(idx) = self.vocabulary.binary_search(&term) {
                vector[idx] += 1.0;
            }
        }
        for (weight, idf) in vector.iter_mut().zip(&self.idf) {
            *weight *= idf;
        }

        normalize_vector(&mut vector);
        vector
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn width(&self) -> usize {
        self.vocabulary.len()
    }

    /// Structural sanity check for a deserialized model.
    pub fn is_consistent(&self) -> bool {
        self.vocabulary.len() == self.idf.len()
            && self.vocabulary.windows(2).all(|w| w[0] < w[1])
            && self.min_ngram >= 1
            && self.max_ngram >= self.min_ngram
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| !ENGLISH_STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn analyze(text: &str, min_ngram: usize, max_ngram: usize) -> Vec<String> {
    let tokens = tokenize(text);
    let mut terms = Vec::new();
    for n in min_ngram..=max_ngram {
        if n > tokens.len() {
            break;
        }
        terms.extend(tokens.windows(n).map(|window| window.join(" ")));
    }
    terms
}
