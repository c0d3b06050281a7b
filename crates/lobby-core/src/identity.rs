//! Identity generation for users and rooms.
//!
//! The lobby never invents ids or display names itself; it asks an
//! [`IdentityProvider`], which can be swapped for deterministic ids in tests
//! or for ids issued by an external directory.

use rand::seq::IndexedRandom;

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "calm", "dapper", "eager", "fuzzy", "gentle", "happy", "icy", "jolly",
    "keen", "lucky", "mellow", "nimble", "odd", "plucky", "quiet", "rapid", "sunny", "tidy",
    "upbeat", "vivid", "witty", "young", "zesty",
];

const NOUNS: &[&str] = &[
    "badger", "comet", "dingo", "falcon", "gecko", "heron", "iguana", "jackal", "koala",
    "lemur", "marmot", "narwhal", "otter", "panda", "quokka", "raven", "stoat", "tapir",
    "urchin", "vole", "walrus", "yak", "zebra",
];

/// Source of fresh ids and default display names.
pub trait IdentityProvider: Send + Sync {
    /// A new unique id.
    fn new_id(&self) -> String;

    /// A human-friendly display name. Need not be unique.
    fn display_name(&self) -> String;
}

/// UUID v7 ids with `adjective-noun` display names.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseIdentity;

impl IdentityProvider for PhraseIdentity {
    fn new_id(&self) -> String {
        uuid::Uuid::now_v7().to_string()
    }

    fn display_name(&self) -> String {
        let mut rng = rand::rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("plain");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("user");
        format!("{adjective}-{noun}")
    }
}

/// Whether `name` is usable as a user or room name.
///
/// Names are non-empty runs of ASCII letters, digits, `_` and `-`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
