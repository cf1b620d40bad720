//! Word list loading, target drawing, and guess validation.

use log::warn;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use shared::WORD_LENGTH;

/// Last-resort corpus used when no word file can be read; the server stays
/// up with a tiny playable set instead of refusing to start.
const FALLBACK_WORDS: [&str; 5] = ["BRAKE", "CRANE", "SLATE", "AROSE", "AUDIO"];

/// The static corpus behind a running server: the playable words targets
/// are drawn from, and the larger set accepted as guesses.
pub struct WordList {
    playable: Vec<String>,
    valid: HashSet<String>,
}

impl WordList {
    /// Loads the playable list from `playable_path` and widens the
    /// valid-guess set with `extra_valid_path`. The extra file is optional
    /// on disk; the playable file is not, and it must contain at least one
    /// usable word.
    pub fn load(playable_path: &Path, extra_valid_path: &Path) -> io::Result<WordList> {
        let playable = read_words(playable_path)?;
        if playable.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} contains no playable words", playable_path.display()),
            ));
        }

        let mut valid: HashSet<String> = playable.iter().cloned().collect();
        match read_words(extra_valid_path) {
            Ok(extra) => valid.extend(extra),
            Err(e) => warn!(
                "extra word list {} not readable: {}",
                extra_valid_path.display(),
                e
            ),
        }

        Ok(WordList { playable, valid })
    }

    /// Builds a list where every word is playable. Unusable entries are
    /// filtered out; an empty result falls back to the built-in corpus.
    pub fn from_words<I, S>(words: I) -> WordList
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_parts(words, std::iter::empty::<&str>())
    }

    /// Builds a list from explicit playable and extra-valid sets, the same
    /// shape `load` produces from its two files.
    pub fn from_parts<I, J, S, T>(playable: I, extra_valid: J) -> WordList
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        J: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut playable: Vec<String> = playable
            .into_iter()
            .filter_map(|word| normalize(word.as_ref()))
            .collect();
        if playable.is_empty() {
            playable = FALLBACK_WORDS.iter().map(|word| word.to_string()).collect();
        }

        let mut valid: HashSet<String> = playable.iter().cloned().collect();
        valid.extend(
            extra_valid
                .into_iter()
                .filter_map(|word| normalize(word.as_ref())),
        );

        WordList { playable, valid }
    }

    /// The built-in corpus.
    pub fn fallback() -> WordList {
        Self::from_words(FALLBACK_WORDS)
    }

    /// Draws a fresh target word.
    pub fn random_word(&self) -> String {
        let mut rng = rand::thread_rng();
        match self.playable.choose(&mut rng) {
            Some(word) => word.clone(),
            // Constructors guarantee a non-empty playable list.
            None => FALLBACK_WORDS[0].to_string(),
        }
    }

    /// Whether `word` is accepted as a guess. Expects the normalized
    /// uppercase form sessions produce.
    pub fn is_valid(&self, word: &str) -> bool {
        self.valid.contains(word)
    }

    pub fn playable_count(&self) -> usize {
        self.playable.len()
    }

    pub fn valid_count(&self) -> usize {
        self.valid.len()
    }
}

/// Uppercases one raw entry and keeps it only if it is exactly
/// `WORD_LENGTH` ASCII letters, the shape the scoring table relies on.
fn normalize(raw: &str) -> Option<String> {
    let word = raw.trim().to_ascii_uppercase();
    if word.len() == WORD_LENGTH && word.bytes().all(|b| b.is_ascii_uppercase()) {
        Some(word)
    } else {
        None
    }
}

fn read_words(path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let mut words = Vec::new();
    for line in BufReader::new(file).lines() {
        if let Some(word) = normalize(&line?) {
            words.push(word);
        }
    }
    Ok(words)
}
