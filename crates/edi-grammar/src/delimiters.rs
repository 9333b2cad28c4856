//! Delimiter sets and escape handling
//!
//! A [`Delimiters`] value holds the separator, escape and decimal characters
//! active for one interchange. The set is `Copy`: overriding delimiters (for
//! example from a UNA service string) always produces a fresh value, so a
//! shared default can never be mutated by one in-flight parse.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default UN/EDIFACT delimiter characters (used when no UNA override is present)
pub const DEFAULT_SEGMENT: char = '\'';
pub const DEFAULT_FIELD: char = '+';
pub const DEFAULT_COMPONENT: char = ':';
pub const DEFAULT_SUB_COMPONENT: char = '^';
pub const DEFAULT_ESCAPE: char = '?';
pub const DEFAULT_DECIMAL_SEPARATOR: char = '.';

/// The delimiter characters for one interchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    /// Segment terminator (default `'`)
    pub segment: char,
    /// Field separator (default `+`)
    pub field: char,
    /// Component separator (default `:`)
    pub component: char,
    /// Sub-component separator (default `^`)
    pub sub_component: char,
    /// Escape (release) character (default `?`)
    pub escape: char,
    /// Decimal separator for numeric values (default `.`)
    pub decimal_separator: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            segment: DEFAULT_SEGMENT,
            field: DEFAULT_FIELD,
            component: DEFAULT_COMPONENT,
            sub_component: DEFAULT_SUB_COMPONENT,
            escape: DEFAULT_ESCAPE,
            decimal_separator: DEFAULT_DECIMAL_SEPARATOR,
        }
    }
}

impl Delimiters {
    /// Create a validated delimiter set
    pub fn new(
        segment: char,
        field: char,
        component: char,
        sub_component: char,
        escape: char,
        decimal_separator: char,
    ) -> Result<Self> {
        let delimiters = Self {
            segment,
            field,
            component,
            sub_component,
            escape,
            decimal_separator,
        };
        delimiters.validate()?;
        Ok(delimiters)
    }

    /// Check that every delimiter role uses a distinct character
    pub fn validate(&self) -> Result<()> {
        let roles: [(&'static str, char); 6] = [
            ("segment", self.segment),
            ("field", self.field),
            ("component", self.component),
            ("sub-component", self.sub_component),
            ("escape", self.escape),
            ("decimal-separator", self.decimal_separator),
        ];
        for (i, (role_a, ch_a)) in roles.iter().enumerate() {
            for (role_b, ch_b) in &roles[i + 1..] {
                if ch_a == ch_b {
                    return Err(Error::DuplicateDelimiter {
                        role_a,
                        role_b,
                        ch: *ch_a,
                    });
                }
            }
        }
        Ok(())
    }

    /// True for the four structural separator characters
    ///
    /// The escape character and decimal separator are not separators: they
    /// never terminate a token.
    pub fn is_separator(&self, c: char) -> bool {
        c == self.segment || c == self.field || c == self.component || c == self.sub_component
    }

    fn needs_escape(&self, c: char) -> bool {
        self.is_separator(c) || c == self.escape
    }

    /// Escape a raw value for emission
    ///
    /// Inserts the escape character before every separator and before the
    /// escape character itself. Must be applied exactly once per value:
    /// re-escaping already escaped text double-escapes it.
    pub fn escape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if self.needs_escape(c) {
                out.push(self.escape);
            }
            out.push(c);
        }
        out
    }

    /// Remove escape characters, making the following character literal
    ///
    /// Inverse of [`Delimiters::escape`]: `unescape(escape(x)) == x` for all
    /// `x`. A trailing unpaired escape character is dropped.
    pub fn unescape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut released = false;
        for c in text.chars() {
            if released {
                out.push(c);
                released = false;
            } else if c == self.escape {
                released = true;
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Split `text` on `delimiter`, skipping escaped occurrences
    ///
    /// Tokens keep their escape sequences intact (unescaping happens once,
    /// when a leaf value is finally consumed). Empty tokens are preserved so
    /// positional matching stays aligned: `"A++B"` yields three tokens.
    pub fn split(&self, text: &str, delimiter: char) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut released = false;
        for c in text.chars() {
            if released {
                current.push(c);
                released = false;
            } else if c == self.escape {
                current.push(c);
                released = true;
            } else if c == delimiter {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        tokens.push(current);
        tokens
    }

    /// Read a delimiter set from a UNA service string advice
    ///
    /// The six characters after the `UNA` tag are, in order: component
    /// separator, field separator, decimal separator, escape character, a
    /// reserved position, and the segment terminator. UNA carries no
    /// sub-component position; that role keeps its default character.
    pub fn from_una(una: &str) -> Option<Self> {
        let mut chars = una.chars();
        if (chars.next()?, chars.next()?, chars.next()?) != ('U', 'N', 'A') {
            return None;
        }
        let component = chars.next()?;
        let field = chars.next()?;
        let decimal_separator = chars.next()?;
        let escape = chars.next()?;
        let _reserved = chars.next()?;
        let segment = chars.next()?;
        Some(Self {
            segment,
            field,
            component,
            sub_component: DEFAULT_SUB_COMPONENT,
            escape,
            decimal_separator,
        })
    }

    /// Render this set as a UNA service string advice
    pub fn to_una(&self) -> String {
        format!(
            "UNA{}{}{}{} {}",
            self.component, self.field, self.decimal_separator, self.escape, self.segment
        )
    }
}
