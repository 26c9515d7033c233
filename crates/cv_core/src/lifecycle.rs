//! Entity lifecycle: `Unparsed → Parsing → Parsed`, crossed with the
//! independent `usable`, `fixed` and `has-invalid-children` flags.
//!
//! The explicit state enum replaces boolean "is parsing" guards: entering
//! `begin_parse` twice is a `LogicError`, never a silent second validation.

use crate::errors::LogicError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseState {
    Unparsed,
    Parsing,
    Parsed,
}

#[derive(Clone, Debug)]
pub struct Lifecycle {
    kind: &'static str,
    state: ParseState,
    usable: bool,
    fixed: bool,
    invalid_children: bool,
}

impl Lifecycle {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: ParseState::Unparsed,
            usable: true,
            fixed: false,
            invalid_children: false,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn begin_parse(&mut self) -> Result<(), LogicError> {
        match self.state {
            ParseState::Unparsed => {
                self.state = ParseState::Parsing;
                Ok(())
            }
            ParseState::Parsing => Err(LogicError::Reentrant(self.kind)),
            ParseState::Parsed => Err(LogicError::AlreadyParsed(self.kind)),
        }
    }

    pub fn end_parse(&mut self) -> Result<(), LogicError> {
        if self.state != ParseState::Parsing {
            return Err(LogicError::NotParsing(self.kind));
        }
        self.state = ParseState::Parsed;
        Ok(())
    }

    #[inline]
    pub fn is_parsed(&self) -> bool {
        self.state == ParseState::Parsed
    }

    #[inline]
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    #[inline]
    pub fn has_invalid_children(&self) -> bool {
        self.invalid_children
    }

    pub fn mark_unusable(&mut self) {
        self.usable = false;
    }

    pub fn mark_fixed(&mut self) {
        self.fixed = true;
    }

    pub fn mark_invalid_children(&mut self) {
        self.invalid_children = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_state_machine_once() {
        let mut l = Lifecycle::new("Report_Item");
        assert_eq!(l.state(), ParseState::Unparsed);
        l.begin_parse().unwrap();
        assert_eq!(l.state(), ParseState::Parsing);
        l.end_parse().unwrap();
        assert!(l.is_parsed());
        assert_eq!(l.begin_parse(), Err(LogicError::AlreadyParsed("Report_Item")));
    }

    #[test]
    fn reentrant_parse_is_a_logic_error() {
        let mut l = Lifecycle::new("Report_Header");
        l.begin_parse().unwrap();
        assert_eq!(l.begin_parse(), Err(LogicError::Reentrant("Report_Header")));
    }

    #[test]
    fn flags_are_independent() {
        let mut l = Lifecycle::new("Item");
        l.mark_fixed();
        assert!(l.is_usable() && l.is_fixed() && !l.has_invalid_children());
        l.mark_unusable();
        l.mark_invalid_children();
        assert!(!l.is_usable() && l.is_fixed() && l.has_invalid_children());
        assert_eq!(l.end_parse(), Err(LogicError::NotParsing("Item")));
    }
}
