use std::fmt;

use itertools::Itertools;
use tracing::trace;

use crate::{
    alphabet::{Alphabet, Symbol},
    math,
    word::{self, concat},
    Show,
};

use super::{MembershipOracle, OracleError};

/// Witnesses that a table is not consistent: `left` and `right` are prefixes with equal rows,
/// but after appending `symbol` they differ on `suffix`. Adding `symbol · suffix` to the
/// experiments separates `left` from `right`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency<S> {
    /// The earlier of the two prefixes, which is the representative of their row class.
    pub left: Vec<S>,
    /// The later of the two prefixes.
    pub right: Vec<S>,
    /// The symbol after which the rows differ.
    pub symbol: S,
    /// The experiment on which the extended rows differ.
    pub suffix: Vec<S>,
}

impl<S: Clone> Inconsistency<S> {
    /// Returns the experiment that needs to be added to resolve the inconsistency.
    pub fn experiment(&self) -> Vec<S> {
        let mut out = vec![self.symbol.clone()];
        out.extend_from_slice(&self.suffix);
        out
    }
}

/// The partition of the prefixes into classes of equal rows. Class ids are handed out in the
/// order in which the classes first occur when going through the prefixes, so class `0` always
/// contains ε.
#[derive(Debug, Clone)]
pub struct RowClasses<S> {
    representatives: Vec<Vec<S>>,
    by_prefix: math::Map<Vec<S>, usize>,
    by_row: math::Map<Vec<bool>, usize>,
}

impl<S: Symbol> RowClasses<S> {
    /// Returns the number of classes.
    pub fn len(&self) -> usize {
        self.representatives.len()
    }

    /// Returns `true` if there are no classes at all.
    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }

    /// Gives the class of a prefix.
    pub fn class_of(&self, prefix: &[S]) -> Option<usize> {
        self.by_prefix.get(prefix).copied()
    }

    /// Gives the class whose members have the given row.
    pub fn class_of_row(&self, row: &[bool]) -> Option<usize> {
        self.by_row.get(row).copied()
    }

    /// The representative of a class is its first member.
    pub fn representative(&self, class: usize) -> Option<&[S]> {
        self.representatives.get(class).map(Vec::as_slice)
    }

    /// Returns the representatives of all classes, indexed by class.
    pub fn representatives(&self) -> &[Vec<S>] {
        &self.representatives
    }
}

/// An observation table as used by Angluin-style learners. It keeps
/// - the prefixes `S`, which are access words of (potential) states,
/// - the boundary `S·Σ \ S`, which are the one-letter extensions of `S` that are not in `S`,
/// - the experiments `E`, which are suffixes used to tell states apart,
/// - and for every row word `r` in `S` or the boundary the observations `r·e` for all `e` in `E`.
///
/// Both `S` and `E` only ever grow and always start with ε. Observations are filled lazily
/// through [`Self::ensure_filled`] and are never recomputed. A row is stored as a vector whose
/// `i`-th entry is the observation for the `i`-th experiment, since new experiments are only
/// ever appended this vector just grows as well.
#[derive(Clone)]
pub struct ObservationTable<S> {
    alphabet: Alphabet<S>,
    prefixes: Vec<Vec<S>>,
    members: math::Set<Vec<S>>,
    boundary: Vec<Vec<S>>,
    experiments: Vec<Vec<S>>,
    rows: math::Map<Vec<S>, Vec<bool>>,
    // answers of the membership oracle, keyed by the queried word
    queries: math::Map<Vec<S>, bool>,
}

impl<S: Symbol> ObservationTable<S> {
    /// Creates a table with `S = E = {ε}` and no observations.
    pub fn new(alphabet: Alphabet<S>) -> Self {
        let mut table = Self {
            alphabet,
            prefixes: vec![vec![]],
            members: math::Set::from_iter([vec![]]),
            boundary: vec![],
            experiments: vec![vec![]],
            rows: math::Map::default(),
            queries: math::Map::default(),
        };
        table.boundary = table.compute_boundary();
        table
    }

    /// Returns a reference to the alphabet.
    pub fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    /// Returns the prefixes `S` in insertion order.
    pub fn prefixes(&self) -> &[Vec<S>] {
        &self.prefixes
    }

    /// Returns the boundary rows `S·Σ \ S`, ordered by the prefix they extend and then by symbol.
    pub fn boundary(&self) -> &[Vec<S>] {
        &self.boundary
    }

    /// Returns the experiments `E` in insertion order.
    pub fn experiments(&self) -> &[Vec<S>] {
        &self.experiments
    }

    /// Checks whether `prefix` is in `S`.
    pub fn contains_prefix(&self, prefix: &[S]) -> bool {
        self.members.contains(prefix)
    }

    /// Returns the row of `word` if it is completely filled.
    pub fn row(&self, word: &[S]) -> Option<&[bool]> {
        self.rows
            .get(word)
            .filter(|row| row.len() == self.experiments.len())
            .map(Vec::as_slice)
    }

    /// Returns the cached answer of the membership oracle for `word`, if it was queried before.
    pub fn cached(&self, word: &[S]) -> Option<bool> {
        self.queries.get(word).copied()
    }

    /// Caches an answer of the membership oracle that was obtained outside of
    /// [`Self::ensure_filled`]. A word that was already answered keeps its first answer.
    pub fn record(&mut self, word: Vec<S>, value: bool) {
        self.queries.entry(word).or_insert(value);
    }

    /// Returns the number of distinct words that have been answered so far.
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    /// Returns the number of filled cells.
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Checks whether every row in `S` and in the boundary has an observation for every
    /// experiment.
    pub fn is_filled(&self) -> bool {
        self.row_words().all(|word| self.row(word).is_some())
    }

    /// Adds `prefix` to `S` if it is not already present. Returns whether `S` changed. Existing
    /// observations stay untouched, the new rows are filled by the next call to
    /// [`Self::ensure_filled`].
    pub fn add_prefix(&mut self, prefix: Vec<S>) -> bool {
        if self.members.contains(&prefix) {
            return false;
        }
        trace!("adding prefix {} to S", prefix.show());
        self.members.insert(prefix.clone());
        self.prefixes.push(prefix);
        self.boundary = self.compute_boundary();
        true
    }

    /// Adds `suffix` to `E` if it is not already present. Returns whether `E` changed.
    pub fn add_experiment(&mut self, suffix: Vec<S>) -> bool {
        if self.experiments.contains(&suffix) {
            return false;
        }
        trace!("adding experiment {} to E", suffix.show());
        self.experiments.push(suffix);
        true
    }

    /// Fills all missing observations by posing membership queries to `oracle` one after the
    /// other. Returns the number of queries that were posed.
    pub fn ensure_filled<M: MembershipOracle<S>>(&mut self, oracle: &M) -> Result<usize, OracleError> {
        self.ensure_filled_with(|words| words.iter().map(|w| oracle.membership(w)).collect())
    }

    /// Fills all missing observations. The words that need to be queried are collected first,
    /// without duplicates and without words whose answer is already cached, and then handed to
    /// `answer` in a single batch. Answers must be given in the order of the batch. Only after
    /// the whole batch has been answered are the results merged into the table, so a failing
    /// batch leaves the table as it was.
    pub fn ensure_filled_with<F, E>(&mut self, mut answer: F) -> Result<usize, E>
    where
        F: FnMut(&[Vec<S>]) -> Result<Vec<bool>, E>,
    {
        let mut pending = vec![];
        let mut requested = math::Set::default();
        for row in self.prefixes.iter().chain(self.boundary.iter()) {
            let filled = self.rows.get(row).map_or(0, Vec::len);
            for experiment in &self.experiments[filled..] {
                let query = concat(row, experiment);
                if !self.queries.contains_key(&query) && requested.insert(query.clone()) {
                    pending.push(query);
                }
            }
        }

        let posed = pending.len();
        if !pending.is_empty() {
            trace!("posing {posed} membership queries to fill the table");
            let answers = answer(&pending)?;
            assert_eq!(answers.len(), posed, "every query must be answered exactly once");
            self.queries.extend(pending.into_iter().zip(answers));
        }

        let width = self.experiments.len();
        for row in self.prefixes.iter().chain(self.boundary.iter()) {
            if self.rows.get(row).map_or(0, Vec::len) == width {
                continue;
            }
            let values = self.rows.entry(row.clone()).or_default();
            for experiment in &self.experiments[values.len()..] {
                values.push(self.queries[&concat(row, experiment)]);
            }
        }
        Ok(posed)
    }

    /// Checks whether the table is closed, meaning every boundary row equals some row in `S`.
    /// If that is not the case, the first boundary row (in boundary order) without a match is
    /// returned and should be promoted to `S`.
    pub fn is_closed(&self) -> Result<(), Vec<S>> {
        let known: math::Set<&[bool]> = self.prefixes.iter().map(|p| self.filled_row(p)).collect();
        match self
            .boundary
            .iter()
            .find(|word| !known.contains(self.filled_row(word)))
        {
            Some(word) => Err(word.clone()),
            None => Ok(()),
        }
    }

    /// Checks whether the table is consistent, meaning that any two prefixes with equal rows
    /// still have equal rows after appending the same symbol.
    ///
    /// The search is deterministic: prefixes are visited in insertion order and each one is
    /// compared with the first earlier prefix that has the same row. Symbols are tried in
    /// alphabet order and experiments in insertion order, the first difference is returned.
    /// Comparing against the class representative suffices, since if every member agrees with
    /// the representative, all members agree with each other.
    pub fn is_consistent(&self) -> Result<(), Inconsistency<S>> {
        let mut representatives: math::Map<&[bool], &Vec<S>> = math::Map::default();
        for prefix in &self.prefixes {
            let row = self.filled_row(prefix);
            let Some(&representative) = representatives.get(row) else {
                representatives.insert(row, prefix);
                continue;
            };

            for symbol in self.alphabet.universe() {
                let left = self.filled_row(&word::extend(representative, symbol));
                let right = self.filled_row(&word::extend(prefix, symbol));
                if let Some(column) = (0..left.len()).find(|&i| left[i] != right[i]) {
                    return Err(Inconsistency {
                        left: representative.clone(),
                        right: prefix.clone(),
                        symbol: symbol.clone(),
                        suffix: self.experiments[column].clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Groups the prefixes by their rows, see [`RowClasses`].
    pub fn row_equivalence_classes(&self) -> RowClasses<S> {
        let mut classes = RowClasses {
            representatives: vec![],
            by_prefix: math::Map::default(),
            by_row: math::Map::default(),
        };
        for prefix in &self.prefixes {
            let fresh = classes.representatives.len();
            let class = *classes
                .by_row
                .entry(self.filled_row(prefix).to_vec())
                .or_insert(fresh);
            if class == fresh {
                classes.representatives.push(prefix.clone());
            }
            classes.by_prefix.insert(prefix.clone(), class);
        }
        classes
    }

    fn row_words(&self) -> impl Iterator<Item = &Vec<S>> + '_ {
        self.prefixes.iter().chain(self.boundary.iter())
    }

    fn filled_row(&self, word: &[S]) -> &[bool] {
        self.row(word)
            .unwrap_or_else(|| panic!("row {} has not been filled", word.show()))
    }

    fn compute_boundary(&self) -> Vec<Vec<S>> {
        self.prefixes
            .iter()
            .flat_map(|prefix| {
                self.alphabet
                    .universe()
                    .map(move |symbol| word::extend(prefix, symbol))
            })
            .filter(|word| !self.members.contains(word))
            .collect()
    }
}

impl<S: Symbol> fmt::Display for ObservationTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        let mut header = vec![String::new(), "row".to_string()];
        header.extend(self.experiments.iter().map(|e| e.show()));
        builder.push_record(header);

        let parts = std::iter::repeat("S")
            .zip(&self.prefixes)
            .chain(std::iter::repeat("S·Σ").zip(&self.boundary));
        for (part, word) in parts {
            let mut record = vec![part.to_string(), word.show()];
            let row = self.rows.get(word).map(Vec::as_slice).unwrap_or_default();
            record.extend(
                (0..self.experiments.len())
                    .map(|i| row.get(i).map_or_else(|| "?".to_string(), |value| value.show())),
            );
            builder.push_record(record);
        }

        write!(f, "{}", builder.build())
    }
}

impl<S: Symbol> fmt::Debug for ObservationTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ObservationTable(S = [{}], E = [{}])\n{}",
            self.prefixes.iter().map(|p| p.show()).join(", "),
            self.experiments.iter().map(|e| e.show()).join(", "),
            self
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{active::FnMembership, alphabet::CharAlphabet};

    fn even_a(word: &[char]) -> bool {
        word.iter().filter(|c| **c == 'a').count() % 2 == 0
    }

    fn ends_in_ab(word: &[char]) -> bool {
        word.ends_with(&['a', 'b'])
    }

    #[test_log::test]
    fn even_a_scenario() {
        let oracle = FnMembership(even_a);
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        assert_eq!(table.ensure_filled(&oracle), Ok(3));
        assert_eq!(table.row(&[]), Some(&[true][..]));
        assert_eq!(table.row(&['a']), Some(&[false][..]));
        assert_eq!(table.row(&['b']), Some(&[true][..]));

        assert_eq!(table.is_closed(), Err(vec!['a']));
        assert!(table.add_prefix(vec!['a']));
        assert_eq!(table.prefixes(), &[vec![], vec!['a']]);
        assert_eq!(table.boundary(), &[vec!['b'], vec!['a', 'a'], vec!['a', 'b']]);

        assert_eq!(table.ensure_filled(&oracle), Ok(2));
        assert_eq!(table.is_closed(), Ok(()));
        assert_eq!(table.is_consistent(), Ok(()));

        let classes = table.row_equivalence_classes();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes.class_of(&[]), Some(0));
        assert_eq!(classes.class_of(&['a']), Some(1));
        assert_eq!(classes.class_of_row(&[true]), Some(0));
        assert_eq!(classes.representative(1), Some(&['a'][..]));
    }

    #[test]
    fn refilling_poses_no_queries() {
        let calls = Cell::new(0);
        let oracle = FnMembership(|w: &[char]| {
            calls.set(calls.get() + 1);
            even_a(w)
        });
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        table.ensure_filled(&oracle).unwrap();
        let cells = table.cell_count();
        assert_eq!(table.ensure_filled(&oracle), Ok(0));
        assert_eq!(table.cell_count(), cells);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn cells_with_equal_words_share_a_query() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        table.ensure_filled(&FnMembership(even_a)).unwrap();
        // the cells (a, b) and (ab, ε) both need the answer for "ab"
        assert!(table.add_experiment(vec!['b']));
        assert!(table.add_prefix(vec!['a']));
        let posed = table
            .ensure_filled_with(|words| {
                let unique: math::Set<_> = words.iter().collect();
                assert_eq!(unique.len(), words.len());
                Ok::<_, OracleError>(words.iter().map(|w| even_a(w)).collect())
            })
            .unwrap();
        assert!(posed < table.cell_count());
        assert!(table.is_filled());
    }

    #[test]
    fn additions_are_idempotent() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        table.ensure_filled(&FnMembership(even_a)).unwrap();
        table.add_prefix(vec!['a']);
        table.ensure_filled(&FnMembership(even_a)).unwrap();

        let before = table.clone();
        assert!(!table.add_prefix(vec![]));
        assert!(!table.add_prefix(vec!['a']));
        assert!(!table.add_experiment(vec![]));
        assert_eq!(table.prefixes(), before.prefixes());
        assert_eq!(table.experiments(), before.experiments());
        assert_eq!(table.cell_count(), before.cell_count());
        assert_eq!(table.query_count(), before.query_count());
        assert!(table.is_filled());
    }

    #[test]
    fn failing_batch_leaves_table_untouched() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        let result = table.ensure_filled_with(|_| Err(OracleError::new("unavailable")));
        assert_eq!(result, Err(OracleError::new("unavailable")));
        assert_eq!(table.cell_count(), 0);
        assert_eq!(table.query_count(), 0);
        assert!(!table.is_filled());
    }

    #[test]
    fn inconsistency_is_found_in_order() {
        let oracle = FnMembership(ends_in_ab);
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        // all prefixes of the counterexample "ab"
        table.add_prefix(vec!['a']);
        table.add_prefix(vec!['a', 'b']);
        table.ensure_filled(&oracle).unwrap();

        // ε and a both reject, but after b only ab accepts
        let inconsistency = table.is_consistent().unwrap_err();
        assert_eq!(
            inconsistency,
            Inconsistency {
                left: vec![],
                right: vec!['a'],
                symbol: 'b',
                suffix: vec![],
            }
        );
        assert_eq!(inconsistency.experiment(), vec!['b']);

        table.add_experiment(inconsistency.experiment());
        table.ensure_filled(&oracle).unwrap();
        assert_eq!(table.is_consistent(), Ok(()));
    }

    #[test]
    fn rendering() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        let unfilled = table.to_string();
        assert!(unfilled.contains('?'));

        table.ensure_filled(&FnMembership(even_a)).unwrap();
        let rendered = table.to_string();
        assert!(rendered.contains("ε"));
        assert!(rendered.contains("S·Σ"));
        assert!(rendered.contains('+'));
        assert!(!rendered.contains('?'));
    }

    #[test]
    #[should_panic(expected = "has not been filled")]
    fn checks_on_unfilled_table_panic() {
        let table = ObservationTable::new(CharAlphabet::of_size(2));
        let _ = table.is_closed();
    }
}
