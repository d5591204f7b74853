use std::str::Chars;

use crate::model::Entry;

pub const MAX_RESULTS: usize = 100;

const SHORT_QUERY_CHARS: usize = 3;
const NGRAM_LEN: usize = 4;

const SHORT_MATCH_DESCRIPTION: i64 = 1;
const SHORT_MATCH_TRANSLATION: i64 = 0;

const SKIP_CANDIDATE_COST: i64 = 1;
const MISSING_QUERY_COST: i64 = 3;
const RUN_DISCOUNT: i64 = 1;

pub fn rank(query: &str, entries: &[Entry]) -> Vec<Entry> {
    if query.is_empty() {
        return entries.iter().take(MAX_RESULTS).cloned().collect();
    }

    let prepared = PreparedQuery::new(query);
    let mut scored: Vec<(i64, usize, &Entry)> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| (prepared.score(entry), index, entry))
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    scored
        .into_iter()
        .take(MAX_RESULTS)
        .map(|(_, _, entry)| entry.clone())
        .collect()
}

pub fn score(query: &str, entry: &Entry) -> i64 {
    PreparedQuery::new(query).score(entry)
}

struct PreparedQuery<'a> {
    text: &'a str,
    chars: Vec<char>,
    // Sorted and deduplicated.
    grams: Vec<u128>,
}

impl<'a> PreparedQuery<'a> {
    fn new(text: &'a str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let mut grams = Vec::new();
        if chars.len() > SHORT_QUERY_CHARS {
            grams.extend(padded_ngrams(text));
            grams.sort_unstable();
            grams.dedup();
        }
        Self { text, chars, grams }
    }

    fn score(&self, entry: &Entry) -> i64 {
        if self.text == entry.translation || self.text == entry.description {
            return i64::MAX;
        }

        if self.chars.len() <= SHORT_QUERY_CHARS {
            return if entry.description.contains(self.text) {
                SHORT_MATCH_DESCRIPTION
            } else if entry.translation.contains(self.text) {
                SHORT_MATCH_TRANSLATION
            } else {
                i64::MIN
            };
        }

        if !self.shares_ngram(&entry.translation) && !self.shares_ngram(&entry.description) {
            return i64::MIN;
        }

        let candidate: Vec<char> = entry
            .translation
            .chars()
            .chain(std::iter::once(' '))
            .chain(entry.description.chars())
            .collect();
        -distance(&self.chars, &candidate)
    }

    fn shares_ngram(&self, text: &str) -> bool {
        padded_ngrams(text).any(|gram| self.grams.binary_search(&gram).is_ok())
    }
}

// One 32-bit lane per char, oldest char highest.
fn padded_ngrams(text: &str) -> PaddedGrams<'_> {
    PaddedGrams {
        chars: text.chars(),
        started: false,
        finished: false,
        key: 0,
        filled: 0,
    }
}

struct PaddedGrams<'a> {
    chars: Chars<'a>,
    started: bool,
    finished: bool,
    key: u128,
    filled: usize,
}

impl PaddedGrams<'_> {
    fn next_char(&mut self) -> Option<char> {
        if !self.started {
            self.started = true;
            return Some(' ');
        }
        match self.chars.next() {
            Some(c) => Some(c),
            None if !self.finished => {
                self.finished = true;
                Some(' ')
            }
            None => None,
        }
    }
}

impl Iterator for PaddedGrams<'_> {
    type Item = u128;

    fn next(&mut self) -> Option<u128> {
        loop {
            let c = self.next_char()?;
            self.key = (self.key << 32) | u128::from(u32::from(c));
            self.filled += 1;
            if self.filled >= NGRAM_LEN {
                return Some(self.key);
            }
        }
    }
}

pub(crate) fn distance(query: &[char], candidate: &[char]) -> i64 {
    let width = candidate.len();
    let mut previous: Vec<i64> = (0..=width)
        .map(|j| j as i64 * SKIP_CANDIDATE_COST)
        .collect();
    let mut current = vec![0_i64; width + 1];

    for i in 1..=query.len() {
        current[0] = i as i64 * MISSING_QUERY_COST;
        for j in 1..=width {
            let mut best = (current[j - 1] + SKIP_CANDIDATE_COST)
                .min(previous[j] + MISSING_QUERY_COST);

            if query[i - 1] == candidate[j - 1] {
                let continues_run = i >= 2 && j >= 2 && query[i - 2] == candidate[j - 2];
                let discount = if continues_run { RUN_DISCOUNT } else { 0 };
                best = best.min(previous[j - 1] - discount);
            }

            current[j] = best;
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[width]
}
