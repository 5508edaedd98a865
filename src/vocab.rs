//! Embedding vocabularies

use fnv::FnvHashMap;

/// Vocabulary of an embedding table.
///
/// Tokens are case-sensitive and are assigned indices in insertion
/// order. The index of a token is the row of its vector in the
/// embedding matrix.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Vocab {
    indices: FnvHashMap<String, usize>,
    words: Vec<String>,
}

impl Vocab {
    /// Construct a vocabulary from unique words.
    ///
    /// Words are assigned indices in the given order. Returns the
    /// first duplicate word as an error when the words are not
    /// unique.
    pub fn new(words: impl Into<Vec<String>>) -> Result<Self, String> {
        let words = words.into();
        let mut indices = FnvHashMap::default();
        indices.reserve(words.len());

        for (idx, word) in words.iter().enumerate() {
            if indices.insert(word.clone(), idx).is_some() {
                return Err(word.clone());
            }
        }

        Ok(Vocab { indices, words })
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut indices = FnvHashMap::default();
        indices.reserve(capacity);
        Vocab {
            indices,
            words: Vec::with_capacity(capacity),
        }
    }

    /// Add a word, returning its index.
    ///
    /// Returns `None` if the word is already in the vocabulary.
    pub(crate) fn push(&mut self, word: String) -> Option<usize> {
        if self.indices.contains_key(&word) {
            return None;
        }

        let idx = self.words.len();
        self.indices.insert(word.clone(), idx);
        self.words.push(word);
        Some(idx)
    }

    /// Get the index of a word.
    pub fn idx(&self, word: &str) -> Option<usize> {
        self.indices.get(word).cloned()
    }

    /// Get the number of words in the vocabulary.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Get the words in the vocabulary, in index order.
    pub fn words(&self) -> &[String] {
        &self.words
    }
}

#[cfg(test)]
mod tests {
    use super::Vocab;

    #[test]
    fn indices_follow_insertion_order() {
        let vocab = Vocab::new(vec!["b".to_string(), "a".to_string(), "A".to_string()]).unwrap();
        assert_eq!(vocab.idx("b"), Some(0));
        assert_eq!(vocab.idx("a"), Some(1));
        assert_eq!(vocab.idx("A"), Some(2));
        assert_eq!(vocab.idx("B"), None);
        assert_eq!(vocab.len(), 3);
    }

    #[test]
    fn duplicates_are_reported() {
        let words = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(Vocab::new(words), Err("a".to_string()));
    }

    #[test]
    fn push_keeps_first_occurrence() {
        let mut vocab = Vocab::with_capacity(2);
        assert_eq!(vocab.push("x".to_string()), Some(0));
        assert_eq!(vocab.push("x".to_string()), None);
        assert_eq!(vocab.push("y".to_string()), Some(1));
        assert_eq!(vocab.words(), &["x", "y"]);
    }
}
