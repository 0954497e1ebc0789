//! Eligibility conditions for mix rules.
//!
//! Conditions are parsed once from their document form when the rule graph
//! is built. Evaluation is ternary: `None` marks a condition that could not be
//! made sense of, and callers treat it as "not satisfied".

use crate::random::UniformSource;
use crate::station::ConditionDef;
use chrono::{NaiveTime, Timelike};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Holds when the fragment following the host is `tag`.
    NextFragment(String),
    /// Holds when a fresh draw is at most the threshold.
    Random(f64),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// Inclusive window in seconds of day.
    TimeWindow { from: u32, to: u32 },
    /// Kept in the tree so evaluation stays ternary.
    Malformed(String),
}

impl Condition {
    /// Turn a document node into a condition. Never fails: anything that
    /// cannot be understood becomes [`Condition::Malformed`].
    pub fn parse(def: &ConditionDef) -> Condition {
        match def.kind.as_str() {
            "nextFragment" => match &def.fragment_tag {
                Some(tag) => Condition::NextFragment(tag.clone()),
                None => Condition::Malformed("nextFragment without fragmentTag".to_string()),
            },
            "random" => match def.probability {
                Some(p) => Condition::Random(p),
                None => Condition::Malformed("random without probability".to_string()),
            },
            "groupAnd" | "groupOr" => {
                let children: Vec<Condition> = def
                    .condition
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(Condition::parse)
                    .collect();
                if def.kind == "groupAnd" {
                    Condition::And(children)
                } else {
                    Condition::Or(children)
                }
            }
            "timeInterval" => {
                let bounds = def
                    .from
                    .as_deref()
                    .zip(def.to.as_deref())
                    .ok_or_else(|| "timeInterval without from/to".to_string())
                    .and_then(|(from, to)| Ok((second_of_day(from)?, second_of_day(to)?)));
                match bounds {
                    Ok((from, to)) => Condition::TimeWindow { from, to },
                    Err(reason) => Condition::Malformed(reason),
                }
            }
            other => Condition::Malformed(format!("unknown condition type '{}'", other)),
        }
    }

    /// Evaluate against the fragment that will follow the host and the
    /// second of day at which the host starts.
    ///
    /// Group children are all evaluated, in order, so every `Random` node in
    /// the tree consumes exactly one draw.
    pub fn evaluate(
        &self,
        next_fragment: &str,
        second_of_day: f64,
        rng: &mut dyn UniformSource,
    ) -> Option<bool> {
        match self {
            Condition::NextFragment(tag) => Some(tag == next_fragment),
            Condition::Random(threshold) => Some(rng.next_f64() <= *threshold),
            Condition::And(children) | Condition::Or(children) if children.len() < 2 => None,
            Condition::And(children) => {
                let results: Vec<Option<bool>> = children
                    .iter()
                    .map(|c| c.evaluate(next_fragment, second_of_day, rng))
                    .collect();
                Some(!results.contains(&Some(false)))
            }
            Condition::Or(children) => {
                let results: Vec<Option<bool>> = children
                    .iter()
                    .map(|c| c.evaluate(next_fragment, second_of_day, rng))
                    .collect();
                Some(results.contains(&Some(true)))
            }
            Condition::TimeWindow { from, to } => {
                Some(f64::from(*from) <= second_of_day && second_of_day <= f64::from(*to))
            }
            Condition::Malformed(_) => None,
        }
    }

    /// Collect the reasons of every malformed node, for diagnostics.
    pub fn problems(&self) -> Vec<String> {
        match self {
            Condition::Malformed(reason) => vec![reason.clone()],
            Condition::And(children) | Condition::Or(children) => {
                let mut out: Vec<String> = children.iter().flat_map(|c| c.problems()).collect();
                if children.len() < 2 {
                    out.push(format!("group with {} condition(s)", children.len()));
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

/// Parse a time string in HH:MM or HH:MM:SS format.
pub fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| format!("Invalid time '{}'. Expected HH:MM or HH:MM:SS", s))
}

/// Seconds elapsed since midnight for an HH:MM[:SS] string.
pub fn second_of_day(s: &str) -> Result<u32, String> {
    parse_time(s).map(|t| t.num_seconds_from_midnight())
}
