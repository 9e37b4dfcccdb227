use std::sync::atomic;

use lazy_static::lazy_static;
use regex::Regex;

/// Hands out fresh JavaScript identifiers for temporaries.
///
/// Every name returned must be distinct from every other name ever returned by the same
/// allocator, and must not clash with names used by the program being compiled.
pub trait TemporaryAllocator {
    fn new_temporary(&self) -> String;
}

/// Helper for generating unique identifiers in a threadsafe manner.
#[derive(Debug)]
pub struct GensymContext {
    prefix: String,
    next_id: atomic::AtomicU64,
}

impl GensymContext {
    pub fn new() -> Self { Self::with_prefix("$t") }

    pub fn with_prefix(prefix: &str) -> Self {
        assert!(is_valid_identifier(&format!("{}0", prefix)), "invalid prefix: {:?}", prefix);
        GensymContext { prefix: prefix.to_owned(), next_id: atomic::AtomicU64::new(0) }
    }

    pub fn gensym(&self) -> String {
        format!("{}{}", self.prefix, self.next_id())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, atomic::Ordering::Relaxed)
    }
}

impl Default for GensymContext {
    fn default() -> Self { Self::new() }
}

impl TemporaryAllocator for GensymContext {
    fn new_temporary(&self) -> String { self.gensym() }
}

/// Whether a string can be written into JavaScript source as an identifier.
///
/// Reserved words are not checked for.
pub fn is_valid_identifier(s: &str) -> bool {
    lazy_static! {
        static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
    }
    IDENT_RE.is_match(s)
}

#[test]
fn gensym_is_unique() {
    let gensym = GensymContext::with_prefix("$x");
    assert_eq!(gensym.gensym(), "$x0");
    assert_eq!(gensym.new_temporary(), "$x1");
    assert!(is_valid_identifier("$x1"));
    assert!(!is_valid_identifier("1x"));
    assert!(!is_valid_identifier("a.b"));
}
