use std::{fmt::Debug, hash::Hash};

use itertools::Itertools;

use crate::Show;

/// A symbol is the smallest unit a word is made of. Symbols must be orderable and hashable so
/// they can be used as keys in the observation table, and they need to be shareable between
/// threads as membership queries may be answered by a pool of workers.
pub trait Symbol: Clone + Eq + Ord + Hash + Debug + Show + Send + Sync + 'static {}

impl<T: Clone + Eq + Ord + Hash + Debug + Show + Send + Sync + 'static> Symbol for T {}

/// An alphabet is a finite, duplicate-free and ordered collection of symbols. The order does not
/// carry any meaning for the language that is learned, it merely fixes the order in which
/// symbols are iterated. This makes every step of the learner reproducible.
///
/// # Example
/// ```
/// use lstar::prelude::*;
///
/// let alphabet = CharAlphabet::of_size(3);
/// assert_eq!(alphabet.universe().collect::<String>(), "abc");
/// assert_eq!(alphabet.position(&'b'), Some(1));
/// ```
#[derive(Clone, Hash, PartialEq, Eq, Debug)]
pub struct Alphabet<S>(Vec<S>);

/// An alphabet whose symbols are single characters.
pub type CharAlphabet = Alphabet<char>;

/// An alphabet whose symbols are whole tokens, such as the commands of a network protocol.
pub type TokenAlphabet = Alphabet<String>;

impl<S: Symbol> Alphabet<S> {
    /// Creates a new alphabet from the given symbols, keeping the order in which they are
    /// given. Repeated symbols are only kept at their first occurrence.
    pub fn new<I: IntoIterator<Item = S>>(symbols: I) -> Self {
        Self(symbols.into_iter().unique().collect())
    }

    /// Returns the number of symbols.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the alphabet contains no symbols.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all symbols in order.
    pub fn universe(&self) -> std::slice::Iter<'_, S> {
        self.0.iter()
    }

    /// Checks whether `symbol` is part of the alphabet.
    pub fn contains(&self, symbol: &S) -> bool {
        self.0.contains(symbol)
    }

    /// Gives the position of `symbol`, if it is part of the alphabet.
    pub fn position(&self, symbol: &S) -> Option<usize> {
        self.0.iter().position(|s| s == symbol)
    }

    /// Returns the symbol at position `pos`.
    pub fn nth(&self, pos: usize) -> Option<&S> {
        self.0.get(pos)
    }

    /// Returns the first symbol of `word` that is not part of the alphabet.
    pub fn first_foreign<'w>(&self, word: &'w [S]) -> Option<&'w S> {
        word.iter().find(|sym| !self.contains(sym))
    }
}

impl CharAlphabet {
    /// Creates a new [`CharAlphabet`] alphabet of the given size. The symbols are just the first `size` letters
    /// of the alphabet, i.e. 'a' to 'z'.
    pub fn of_size(size: usize) -> Self {
        assert!(size <= 26, "Alphabet is too large");
        Self((0..size).map(|i| (b'a' + i as u8) as char).collect())
    }
}

impl TokenAlphabet {
    /// Creates a token alphabet from string slices.
    pub fn from_tokens<'a, I: IntoIterator<Item = &'a str>>(tokens: I) -> Self {
        Self::new(tokens.into_iter().map(str::to_string))
    }

    /// Splits `input` at whitespace and interprets every piece as a token. Returns `None` if
    /// some piece is not a token of the alphabet.
    pub fn parse_word(&self, input: &str) -> Option<Vec<String>> {
        input
            .split_whitespace()
            .map(|token| {
                let token = token.to_string();
                self.contains(&token).then_some(token)
            })
            .collect()
    }
}

impl<S: Symbol> FromIterator<S> for Alphabet<S> {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().unique().sorted().collect())
    }
}

impl<S> std::ops::Index<usize> for Alphabet<S> {
    type Output = S;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<S: Symbol> std::fmt::Display for Alphabet<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0.iter().map(|sym| sym.show()).join(", "))
    }
}

impl Show for char {
    fn show(&self) -> String {
        self.to_string()
    }
}
