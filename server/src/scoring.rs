//! Per-letter scoring of a guess against the target word.

use shared::{ABSENT, CORRECT, PRESENT, WORD_LENGTH};

/// Scores `guess` against `target`, one verdict code per position.
///
/// Two passes over a remaining-count table seeded from the target's letter
/// multiset: pass one marks exact positions and consumes their letter,
/// pass two marks misplaced letters while occurrences remain. A letter
/// guessed more often than it occurs in the target therefore gets at most
/// as many non-zero marks as its multiplicity.
///
/// Both inputs must be `WORD_LENGTH` uppercase ASCII letters; callers
/// validate before scoring.
pub fn score_guess(guess: &str, target: &str) -> [u8; WORD_LENGTH] {
    let guess = guess.as_bytes();
    let target = target.as_bytes();
    debug_assert_eq!(guess.len(), WORD_LENGTH);
    debug_assert_eq!(target.len(), WORD_LENGTH);

    let mut verdict = [ABSENT; WORD_LENGTH];
    let mut remaining = [0u8; 26];
    for &letter in target {
        remaining[(letter - b'A') as usize] += 1;
    }

    for position in 0..WORD_LENGTH {
        if guess[position] == target[position] {
            verdict[position] = CORRECT;
            remaining[(guess[position] - b'A') as usize] -= 1;
        }
    }

    for position in 0..WORD_LENGTH {
        if verdict[position] == ABSENT {
            let slot = &mut remaining[(guess[position] - b'A') as usize];
            if *slot > 0 {
                verdict[position] = PRESENT;
                *slot -= 1;
            }
        }
    }

    verdict
}
