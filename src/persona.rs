//! Persona inference from profile demographics.
//!
//! Rules are evaluated top to bottom and the first match wins. Anything that
//! matches no rule falls through to the age-based default.

use tracing::debug;

use crate::models::{Persona, Product, Profile};

type Predicate = fn(&Profile, &Product) -> bool;

pub struct PersonaRule {
    pub name: &'static str,
    pub matches: Predicate,
    pub persona: Persona,
}

pub const RULES: &[PersonaRule] = &[
    PersonaRule {
        name: "young_male",
        matches: |p, _| age_range_is(p, "18-25") && eq_ignore_case(&p.gender, "male"),
        persona: Persona::Streetwear,
    },
    PersonaRule {
        name: "young_adult_female",
        matches: |p, _| age_range_is(p, "26-35") && eq_ignore_case(&p.gender, "female"),
        persona: Persona::Minimalist,
    },
    PersonaRule {
        name: "midlife_premium",
        matches: |p, _| age_range_is(p, "36-45") && eq_ignore_case(&p.price_tier, "premium"),
        persona: Persona::LuxuryClassic,
    },
    PersonaRule {
        name: "young_athleisure",
        matches: |p, _| {
            age_range_within(p, 18, 35) && eq_ignore_case(&p.preferred_category, "athleisure")
        },
        persona: Persona::Athleisure,
    },
];

/// Age below which the fallthrough picks Streetwear.
const STREETWEAR_AGE_CUTOFF: u32 = 30;

pub fn classify(profile: &Profile, product: &Product) -> Persona {
    if let Some(rule) = RULES.iter().find(|rule| (rule.matches)(profile, product)) {
        debug!(rule = rule.name, persona = %rule.persona, "persona rule matched");
        return rule.persona;
    }

    let persona = match profile.age_range.as_deref().and_then(|r| age_bounds(r).map(|b| b.0)) {
        Some(lower) if lower < STREETWEAR_AGE_CUTOFF => Persona::Streetwear,
        _ => Persona::Minimalist,
    };
    debug!(age_range = ?profile.age_range, %persona, "persona fell through to age default");
    persona
}

/// Parses "18-25", "18–25" or "65+" into inclusive bounds. Open ranges have no upper bound.
fn age_bounds(range: &str) -> Option<(u32, Option<u32>)> {
    let normalized = range.trim().replace(['–', '—'], "-");
    if let Some(open) = normalized.strip_suffix('+') {
        return open.trim().parse().ok().map(|lower| (lower, None));
    }
    let mut parts = normalized.splitn(2, '-');
    let lower = parts.next()?.trim().parse().ok()?;
    let upper = match parts.next() {
        Some(upper) => Some(upper.trim().parse().ok()?),
        None => Some(lower),
    };
    Some((lower, upper))
}

fn age_range_is(profile: &Profile, expected: &str) -> bool {
    match (profile.age_range.as_deref().and_then(age_bounds), age_bounds(expected)) {
        (Some(actual), Some(expected)) => actual == expected,
        _ => false,
    }
}

fn age_range_within(profile: &Profile, min: u32, max: u32) -> bool {
    match profile.age_range.as_deref().and_then(age_bounds) {
        Some((lower, Some(upper))) => lower >= min && upper <= max,
        _ => false,
    }
}

fn eq_ignore_case(value: &Option<String>, expected: &str) -> bool {
    value.as_deref().is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
}
