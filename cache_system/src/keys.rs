//! Cache key derivation
//!
//! A key is derived from the logical origin of a call: the owning type, the
//! operation and the ordered arguments. Callers pass these explicitly.

use std::fmt::{Display, Write};

/// Derives a store key from a call signature
pub trait KeyGenerator: Send + Sync {
    fn generate(&self, owner: &str, operation: &str, args: &[&dyn Display]) -> String;
}

/// Concatenates owner, operation and arguments with no delimiter.
///
/// This is not injective: `("Foo", "bar", ["1"])` and `("Foo", "bar1", [""])`
/// yield the same key. Use [`DelimitedKeyGenerator`] when arguments may
/// blur segment boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatKeyGenerator;

impl KeyGenerator for ConcatKeyGenerator {
    fn generate(&self, owner: &str, operation: &str, args: &[&dyn Display]) -> String {
        let mut key = String::with_capacity(owner.len() + operation.len() + 8 * args.len());
        key.push_str(owner);
        key.push_str(operation);
        for arg in args {
            let _ = write!(key, "{arg}");
        }
        key
    }
}

/// Joins segments with a reserved delimiter, escaping it inside segments.
///
/// Distinct call signatures always produce distinct keys. Keys differ from
/// the ones [`ConcatKeyGenerator`] produces, so switching generators
/// orphans existing entries.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedKeyGenerator {
    delimiter: char,
    escape: char,
}

impl Default for DelimitedKeyGenerator {
    fn default() -> Self {
        Self {
            delimiter: ':',
            escape: '\\',
        }
    }
}

impl DelimitedKeyGenerator {
    /// Returns `None` when delimiter and escape are the same character
    pub fn new(delimiter: char, escape: char) -> Option<Self> {
        (delimiter != escape).then_some(Self { delimiter, escape })
    }

    fn push_segment(&self, key: &mut String, segment: &str) {
        for c in segment.chars() {
            if c == self.delimiter || c == self.escape {
                key.push(self.escape);
            }
            key.push(c);
        }
    }
}

impl KeyGenerator for DelimitedKeyGenerator {
    fn generate(&self, owner: &str, operation: &str, args: &[&dyn Display]) -> String {
        let mut key = String::new();
        self.push_segment(&mut key, owner);
        key.push(self.delimiter);
        self.push_segment(&mut key, operation);
        for arg in args {
            key.push(self.delimiter);
            self.push_segment(&mut key, &arg.to_string());
        }
        key
    }
}

/// Unqualified name of a type, without module path or generic parameters
///
/// `simple_type_name::<my_app::orders::OrderService>()` is `"OrderService"`.
/// Derived from [`std::any::type_name`], whose exact output is not
/// guaranteed across compiler versions; pass a literal owner name where keys
/// must survive toolchain upgrades.
pub fn simple_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
