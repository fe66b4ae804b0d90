//! Human-readable project slugs

use std::sync::LazyLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

/// Three lowercase words joined by hyphens
static SLUG_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z]+-[a-z]+-[a-z]+$").ok());

const ADJECTIVES: &[&str] = &[
    "agile", "amber", "ancient", "autumn", "bold", "brave", "bright", "calm", "clever", "cosmic",
    "crimson", "curious", "daring", "eager", "electric", "fancy", "fearless", "gentle", "golden",
    "grand", "happy", "hidden", "humble", "icy", "jolly", "keen", "lively", "lucky", "mellow",
    "mighty", "misty", "noble", "patient", "polished", "proud", "quiet", "rapid", "rustic",
    "silent", "silver", "sleek", "solid", "sunny", "swift", "tidy", "vivid", "wild", "wise",
];

const ANIMALS: &[&str] = &[
    "badger", "bear", "beaver", "bison", "crane", "dolphin", "eagle", "falcon", "ferret", "fox",
    "gecko", "heron", "ibex", "jaguar", "koala", "lemur", "lynx", "marten", "moose", "newt",
    "ocelot", "otter", "owl", "panda", "puffin", "quail", "raven", "salmon", "seal", "sparrow",
    "tiger", "toucan", "turtle", "walrus", "whale", "wolf", "wombat", "yak", "zebra",
];

/// Whether a subdomain has the shape of a project slug
pub fn is_slug(candidate: &str) -> bool {
    SLUG_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(candidate))
}

/// Generate a slug `<adjective>-<adjective>-<animal>`
pub fn generate_slug<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = ADJECTIVES.choose(rng).copied().unwrap_or("brave");
    let second = ADJECTIVES
        .iter()
        .filter(|word| **word != first)
        .copied()
        .collect::<Vec<_>>()
        .choose(rng)
        .copied()
        .unwrap_or("solid");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("otter");
    format!("{}-{}-{}", first, second, animal)
}
