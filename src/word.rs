//! Finite words are represented as `Vec<S>` (or borrowed as `&[S]`), the empty vector being the
//! empty word ε. This module collects the few operations on them that the learner needs.

use crate::alphabet::{Alphabet, Symbol};

/// Concatenates `left` and `right` into a new word.
pub fn concat<S: Clone>(left: &[S], right: &[S]) -> Vec<S> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    out.extend_from_slice(left);
    out.extend_from_slice(right);
    out
}

/// Appends a single symbol to a copy of `word`.
pub fn extend<S: Clone>(word: &[S], symbol: &S) -> Vec<S> {
    let mut out = Vec::with_capacity(word.len() + 1);
    out.extend_from_slice(word);
    out.push(symbol.clone());
    out
}

/// Iterates over the non-empty prefixes of `word` in order of increasing length, ending with
/// `word` itself.
pub fn prefixes<S>(word: &[S]) -> impl Iterator<Item = &[S]> + '_ {
    (1..=word.len()).map(move |length| &word[..length])
}

/// Enumerates all words over an alphabet up to a maximal length in length-lexicographic order,
/// where symbols are ordered as in the alphabet. The enumeration starts with ε.
#[derive(Debug, Clone)]
pub struct LengthLex<'a, S> {
    alphabet: &'a Alphabet<S>,
    max_length: usize,
    current: Option<Vec<usize>>,
}

/// Returns an iterator over all words of length at most `max_length`, see [`LengthLex`].
pub fn words_up_to<S: Symbol>(alphabet: &Alphabet<S>, max_length: usize) -> LengthLex<'_, S> {
    LengthLex {
        alphabet,
        max_length,
        current: Some(vec![]),
    }
}

impl<'a, S: Symbol> LengthLex<'a, S> {
    fn successor(&self, mut positions: Vec<usize>) -> Option<Vec<usize>> {
        let size = self.alphabet.size();
        if size == 0 {
            return None;
        }
        for position in (0..positions.len()).rev() {
            if positions[position] + 1 < size {
                positions[position] += 1;
                return Some(positions);
            }
            positions[position] = 0;
        }
        // every position wrapped around, so we move on to the next length
        (positions.len() < self.max_length).then(|| vec![0; positions.len() + 1])
    }
}

impl<'a, S: Symbol> Iterator for LengthLex<'a, S> {
    type Item = Vec<S>;

    fn next(&mut self) -> Option<Self::Item> {
        let positions = self.current.take()?;
        let word = positions.iter().map(|&i| self.alphabet[i].clone()).collect();
        self.current = self.successor(positions);
        Some(word)
    }
}
