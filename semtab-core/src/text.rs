//! # Utilidades de Texto — Saco de Palavras e Similaridade de Cosseno
//!
//! As descrições das entidades são comparadas como vetores de contagem de
//! palavras (saco de palavras), depois de remover pontuação e *stopwords* em
//! inglês. A similaridade entre duas descrições é o cosseno entre os vetores.
//!
//! A segmentação de palavras usa os limites Unicode oficiais
//! (`unicode-segmentation`), o que lida corretamente com hífens, apóstrofos
//! e pontuação colada.

use std::collections::HashMap;

use unicode_segmentation::UnicodeSegmentation;

/// Stopwords do inglês (subconjunto das listas clássicas de IR).
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between",
    "both", "but", "by", "can", "did", "do", "does", "doing", "down", "during",
    "each", "few", "for", "from", "further", "had", "has", "have", "having",
    "he", "her", "here", "hers", "him", "his", "how", "i", "if", "in", "into",
    "is", "it", "its", "just", "me", "more", "most", "my", "no", "nor", "not",
    "now", "of", "off", "on", "once", "only", "or", "other", "our", "out",
    "over", "own", "same", "she", "should", "so", "some", "such", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was",
    "we", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "you", "your",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Divide um texto em palavras pelos limites Unicode.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.unicode_words()
}

/// Número de palavras de um texto (feature derivada de comprimento).
pub fn word_count(text: &str) -> usize {
    words(text).count()
}

/// Remove pontuação e stopwords, preservando a ordem das palavras restantes.
pub fn remove_stopwords(text: &str) -> String {
    words(text)
        .filter(|w| !is_stopword(w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Vetor de contagem de palavras (minúsculas, sem stopwords).
pub fn bag_of_words(text: &str) -> HashMap<String, usize> {
    let mut bag = HashMap::new();
    for word in words(text) {
        let lower = word.to_lowercase();
        if is_stopword(&lower) {
            continue;
        }
        *bag.entry(lower).or_insert(0) += 1;
    }
    bag
}

/// Similaridade de cosseno entre dois vetores de contagem.
///
/// Simétrica, em `[0, 1]`; retorna 0.0 se qualquer um dos vetores for vazio.
pub fn cosine_similarity(a: &HashMap<String, usize>, b: &HashMap<String, usize>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .filter_map(|(word, &count)| b.get(word).map(|&other| (count * other) as f64))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }

    let norm = |bag: &HashMap<String, usize>| -> f64 {
        bag.values().map(|&c| (c * c) as f64).sum::<f64>().sqrt()
    };

    dot / (norm(a) * norm(b))
}
