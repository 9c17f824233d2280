//! Initiative roll formulas.
//!
//! A formula is a sum of dice and constant terms: `2d10+3`, `d20 - 1`, `12`.
//! The evaluator is a trait so a game system can plug in its own grammar.

use crate::error::DomainError;
use crate::rng::DeterministicRng;

const MAX_DICE: u32 = 100;
const MAX_SIDES: u32 = 1000;

/// Evaluates an initiative formula into a numeric rank.
pub trait RollEvaluator: Send + Sync {
    /// Rolls `formula` with randomness drawn from `rng`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the formula cannot be evaluated.
    fn roll(&self, formula: &str, rng: &mut dyn DeterministicRng) -> Result<i32, DomainError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Term {
    Dice { count: u32, sides: u32 },
    Constant(i64),
}

/// `NdM ± K` dice evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiceRollEvaluator;

impl RollEvaluator for DiceRollEvaluator {
    fn roll(&self, formula: &str, rng: &mut dyn DeterministicRng) -> Result<i32, DomainError> {
        let mut total: i64 = 0;
        for (sign, term) in parse_terms(formula)? {
            let value = match term {
                Term::Dice { count, sides } => (0..count)
                    .map(|_| i64::from(rng.next_u32_range(1, sides)))
                    .sum::<i64>(),
                Term::Constant(value) => value,
            };
            total = total.saturating_add(sign * value);
        }
        Ok(i32::try_from(total).unwrap_or(if total < 0 { i32::MIN } else { i32::MAX }))
    }
}

fn invalid(formula: &str, reason: &str) -> DomainError {
    DomainError::Validation(format!("invalid roll formula '{formula}': {reason}"))
}

fn parse_terms(formula: &str) -> Result<Vec<(i64, Term)>, DomainError> {
    let compact: String = formula.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(invalid(formula, "empty formula"));
    }

    let mut terms = Vec::new();
    let mut sign = 1;
    let mut current = String::new();
    for (i, ch) in compact.char_indices() {
        match ch {
            '+' | '-' => {
                if current.is_empty() {
                    if i != 0 {
                        return Err(invalid(formula, "dangling operator"));
                    }
                } else {
                    terms.push((sign, parse_term(formula, &current)?));
                    current.clear();
                }
                sign = if ch == '-' { -1 } else { 1 };
            }
            _ => current.push(ch),
        }
    }
    if current.is_empty() {
        return Err(invalid(formula, "dangling operator"));
    }
    terms.push((sign, parse_term(formula, &current)?));
    Ok(terms)
}

fn parse_term(formula: &str, term: &str) -> Result<Term, DomainError> {
    let lowered = term.to_ascii_lowercase();
    let Some((count, sides)) = lowered.split_once('d') else {
        return lowered
            .parse::<i64>()
            .map(Term::Constant)
            .map_err(|_| invalid(formula, &format!("'{term}' is not a number")));
    };

    let count = if count.is_empty() {
        1
    } else {
        count
            .parse::<u32>()
            .map_err(|_| invalid(formula, &format!("bad dice count in '{term}'")))?
    };
    let sides = sides
        .parse::<u32>()
        .map_err(|_| invalid(formula, &format!("bad die size in '{term}'")))?;

    if count == 0 || count > MAX_DICE {
        return Err(invalid(formula, "dice count out of range"));
    }
    if sides == 0 || sides > MAX_SIDES {
        return Err(invalid(formula, "die size out of range"));
    }
    Ok(Term::Dice { count, sides })
}
