//! Stable addresses ("fixed URLs") for topics.
//!
//! Every topic in a book gets a slug derived from its title that is unique
//! across the whole topic store. Slugs are persisted as a topic property so
//! that anchors and output file names survive rebuilds.

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use regex::Regex;

use crate::cancel::CancellationToken;
use crate::error::{BuildError, Result};
use crate::store::{TopicPropertyUpdate, TopicStore};
use crate::topic::{PropertyTag, Topic, FIXED_URL_PROPERTY_TAG_ID};

/// Default number of attempts at the whole probe-and-persist sequence.
pub const DEFAULT_MAX_RETRIES: usize = 5;
/// Default number of numeric suffixes tried per slug.
pub const DEFAULT_MAX_NAME_ATTEMPTS: usize = 100;

lazy_static::lazy_static! {
    static ref LEADING_NON_WORD: Regex = Regex::new(r"^[^A-Za-z0-9_]+").unwrap();
    static ref LEADING_DIGITS: Regex = Regex::new(r"^([0-9]+)").unwrap();
}

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const SCALES: [(u64, &str); 6] = [
    (1_000_000_000_000_000_000, "quintillion"),
    (1_000_000_000_000_000, "quadrillion"),
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

/// Spells a number out in English words, e.g. `121` → `one hundred twenty-one`.
pub fn spell_out(number: u64) -> String {
    if number < 20 {
        return ONES[number as usize].to_string();
    }
    if number < 100 {
        let tens = TENS[(number / 10) as usize];
        return match number % 10 {
            0 => tens.to_string(),
            ones => format!("{}-{}", tens, ONES[ones as usize]),
        };
    }
    if number < 1000 {
        let hundreds = format!("{} hundred", ONES[(number / 100) as usize]);
        return match number % 100 {
            0 => hundreds,
            rest => format!("{} {}", hundreds, spell_out(rest)),
        };
    }
    let (scale, name) = SCALES
        .iter()
        .copied()
        .find(|(scale, _)| number >= *scale)
        .unwrap_or(SCALES[SCALES.len() - 1]);
    let head = format!("{} {}", spell_out(number / scale), name);
    match number % scale {
        0 => head,
        rest => format!("{} {}", head, spell_out(rest)),
    }
}

/// Makes a title safe for use in file names and anchors: spaces become
/// underscores and anything outside `[A-Za-z0-9_.-]` is dropped.
pub fn escape_title(title: &str) -> String {
    title
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') => Some(c),
            _ => None,
        })
        .collect()
}

/// Derives the base slug for a title.
///
/// A leading run of non-word characters is stripped and a leading number is
/// spelled out, so that the result is a valid XML id.
pub fn create_url_title(title: &str) -> String {
    let mut base = LEADING_NON_WORD.replace(title, "").into_owned();

    let digits = LEADING_DIGITS
        .captures(&base)
        .and_then(|caps| caps.get(1))
        .map(|m| (m.end(), m.as_str().to_string()));
    if let Some((end, digits)) = digits {
        // runs too long for u64 are spelled digit by digit
        let words = match digits.parse::<u64>() {
            Ok(number) => spell_out(number),
            Err(_) => digits
                .chars()
                .filter_map(|d| d.to_digit(10))
                .map(|d| ONES[d as usize])
                .collect::<Vec<_>>()
                .join("-"),
        };
        let spelled = format!("{}{}", words, &base[end..]);
        let mut chars = spelled.chars();
        base = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => spelled,
        };
    }

    let mut escaped = escape_title(&base);
    while escaped.contains("__") {
        escaped = escaped.replace("__", "_");
    }
    escaped
}

/// Assigns and persists stable addresses for a set of topics.
pub struct FixedUrlAssigner<'a, S: TopicStore + ?Sized> {
    store: &'a S,
    cancel: &'a CancellationToken,
    max_retries: usize,
    max_name_attempts: usize,
}

impl<'a, S: TopicStore + ?Sized> FixedUrlAssigner<'a, S> {
    pub fn new(store: &'a S, cancel: &'a CancellationToken) -> Self {
        Self {
            store,
            cancel,
            max_retries: DEFAULT_MAX_RETRIES,
            max_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
        }
    }

    pub fn with_limits(mut self, max_retries: usize, max_name_attempts: usize) -> Self {
        self.max_retries = max_retries;
        self.max_name_attempts = max_name_attempts;
        self
    }

    /// Gives every topic lacking a valid stable address a new one.
    ///
    /// Returns `Ok(false)` when the store kept failing and the retries ran
    /// out; the build must then use id-based addressing throughout.
    pub fn assign(&self, topics: &mut [Topic]) -> Result<bool> {
        for attempt in 1..=self.max_retries {
            self.cancel.check()?;
            match self.try_assign(topics) {
                Ok(count) => {
                    info!("Assigned {} new fixed URLs", count);
                    return Ok(true);
                }
                Err(BuildError::Store(e)) => {
                    warn!(
                        "Failed to set fixed URL properties (attempt {}/{}): {}",
                        attempt, self.max_retries, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    fn try_assign(&self, topics: &mut [Topic]) -> Result<usize> {
        let mut used: HashSet<String> = HashSet::new();
        let mut assigned: HashMap<i64, PropertyTag> = HashMap::new();
        let mut updates = Vec::new();

        for topic in topics.iter() {
            if let Some(existing) = valid_fixed_url(topic) {
                used.insert(existing.to_string());
            }
        }

        for topic in topics.iter() {
            self.cancel.check()?;
            if valid_fixed_url(topic).is_some() {
                continue;
            }

            let mut base = create_url_title(&topic.title);
            if base.is_empty() {
                base = format!("TopicID{}", topic.id);
            }
            let slug = self.probe(topic.id, &base, &used)?;
            debug!("Topic {} gets fixed URL {}", topic.id, slug);
            used.insert(slug.clone());

            let property = PropertyTag::new(FIXED_URL_PROPERTY_TAG_ID, slug);
            if topic.id >= 0 {
                updates.push(TopicPropertyUpdate {
                    topic_id: topic.id,
                    add: property.clone(),
                    remove: topic
                        .properties
                        .iter()
                        .filter(|p| p.id == FIXED_URL_PROPERTY_TAG_ID)
                        .cloned()
                        .collect(),
                });
            }
            assigned.insert(topic.id, property);
        }

        if !updates.is_empty() {
            self.store.update_topic_properties(&updates)?;
        }

        for topic in topics.iter_mut() {
            if let Some(property) = assigned.get(&topic.id) {
                set_fixed_url(topic, property);
            }
            for related in topic.outgoing.iter_mut().chain(topic.incoming.iter_mut()) {
                if let Some(property) = assigned.get(&related.topic_id()) {
                    set_fixed_url(related.base_mut(), property);
                }
            }
        }

        Ok(assigned.len())
    }

    /// First of `base`, `base1`, `base2`, … not used by another topic. Gives
    /// up on the last attempted suffix once the attempts run out.
    fn probe(&self, topic_id: i64, base: &str, used: &HashSet<String>) -> Result<String> {
        let mut suffix = 0;
        loop {
            let candidate = if suffix == 0 {
                base.to_string()
            } else {
                format!("{}{}", base, suffix)
            };
            let taken = used.contains(&candidate)
                || self
                    .store
                    .topics_with_property(FIXED_URL_PROPERTY_TAG_ID, &candidate)?
                    .iter()
                    .any(|id| *id != topic_id);
            if !taken || suffix >= self.max_name_attempts {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}

fn valid_fixed_url(topic: &Topic) -> Option<&str> {
    topic
        .properties
        .iter()
        .find(|p| p.id == FIXED_URL_PROPERTY_TAG_ID && p.valid && !p.value.is_empty())
        .map(|p| p.value.as_str())
}

fn set_fixed_url(topic: &mut Topic, property: &PropertyTag) {
    topic
        .properties
        .retain(|p| p.id != FIXED_URL_PROPERTY_TAG_ID);
    topic.properties.push(property.clone());
}
