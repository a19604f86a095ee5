use regex::{NoExpand, Regex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Delimiters {
    pub fn new(open: &str, close: &str) -> Self {
        Self {
            open: open.to_string(),
            close: close.to_string(),
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::new("{{", "}}")
    }
}

/// Token patterns for one bound column.
#[derive(Debug, Clone)]
pub struct TokenMatcher {
    specific: Regex,
    generic: Regex,
}

impl TokenMatcher {
    /// `column` matches case-insensitively and tolerates whitespace inside the
    /// delimiters (`{{ Price }}` binds column `price`).
    pub fn new(delimiters: &[Delimiters], column: &str) -> Result<Self, regex::Error> {
        let fallback = [Delimiters::default()];
        let delimiters = if delimiters.is_empty() {
            &fallback[..]
        } else {
            delimiters
        };
        let name = regex::escape(column.trim());
        let mut specific = Vec::new();
        let mut generic = Vec::new();
        for delim in delimiters {
            let open = regex::escape(&delim.open);
            let close = regex::escape(&delim.close);
            let excluded: String = delim
                .open
                .chars()
                .chain(delim.close.chars())
                .map(|ch| regex::escape(&ch.to_string()))
                .collect();
            specific.push(format!(r"{open}\s*(?i:{name})\s*{close}"));
            generic.push(format!(
                r"{open}\s*[^\s\r\n{excluded}][^\r\n{excluded}]*?\s*{close}"
            ));
        }
        Ok(Self {
            specific: Regex::new(&specific.join("|"))?,
            generic: Regex::new(&generic.join("|"))?,
        })
    }

    pub fn matches_specific(&self, text: &str) -> bool {
        self.specific.is_match(text)
    }

    pub fn matches_generic(&self, text: &str) -> bool {
        self.generic.is_match(text)
    }

    pub fn replace_specific(&self, text: &str, value: &str) -> String {
        self.specific.replace_all(text, NoExpand(value)).into_owned()
    }

    pub fn replace_generic(&self, text: &str, value: &str) -> String {
        self.generic.replace_all(text, NoExpand(value)).into_owned()
    }
}

/// Snapshot of a text-bearing element's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextView {
    /// Character data of each descendant text node, document order. Rewriting
    /// fragments one by one keeps the formatting markup around them intact.
    pub fragments: Vec<String>,
    /// Number of inline formatting children (`tspan` and similar).
    pub formatting_children: usize,
}

impl TextView {
    pub fn plain_text(&self) -> String {
        self.fragments.concat()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// New text for every fragment, same order as [`TextView::fragments`].
    Fragments(Vec<String>),
    /// Replace the whole content with this text, dropping formatting children.
    Collapse(String),
    /// Overwrite the text of the sole formatting child.
    OverwriteChild(String),
    /// Overwrite the element's text wholesale.
    OverwriteAll(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SpecificInMarkup,
    GenericInMarkup,
    SpecificInPlainText,
    GenericInPlainText,
    IdentifierOverwrite,
}

/// Resolution order for a text element; first match wins.
pub const CASCADE: [Strategy; 5] = [
    Strategy::SpecificInMarkup,
    Strategy::GenericInMarkup,
    Strategy::SpecificInPlainText,
    Strategy::GenericInPlainText,
    Strategy::IdentifierOverwrite,
];

/// Token-driven steps only; used for descendants of a group, where the
/// identifier fallback is decided once for the whole group.
pub const TOKEN_STRATEGIES: [Strategy; 4] = [
    Strategy::SpecificInMarkup,
    Strategy::GenericInMarkup,
    Strategy::SpecificInPlainText,
    Strategy::GenericInPlainText,
];

impl Strategy {
    pub fn apply(self, view: &TextView, matcher: &TokenMatcher, value: &str) -> Option<Resolution> {
        match self {
            Strategy::SpecificInMarkup => {
                if !view.fragments.iter().any(|f| matcher.matches_specific(f)) {
                    return None;
                }
                Some(Resolution::Fragments(
                    view.fragments
                        .iter()
                        .map(|f| matcher.replace_specific(f, value))
                        .collect(),
                ))
            }
            Strategy::GenericInMarkup => {
                if !view.fragments.iter().any(|f| matcher.matches_generic(f)) {
                    return None;
                }
                Some(Resolution::Fragments(
                    view.fragments
                        .iter()
                        .map(|f| matcher.replace_generic(f, value))
                        .collect(),
                ))
            }
            Strategy::SpecificInPlainText => {
                let plain = view.plain_text();
                matcher
                    .matches_specific(&plain)
                    .then(|| Resolution::Collapse(matcher.replace_specific(&plain, value)))
            }
            Strategy::GenericInPlainText => {
                let plain = view.plain_text();
                matcher
                    .matches_generic(&plain)
                    .then(|| Resolution::Collapse(matcher.replace_generic(&plain, value)))
            }
            Strategy::IdentifierOverwrite => Some(if view.formatting_children == 1 {
                Resolution::OverwriteChild(value.to_string())
            } else {
                Resolution::OverwriteAll(value.to_string())
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub strategy: Strategy,
    pub resolution: Resolution,
}

pub fn resolve(
    view: &TextView,
    matcher: &TokenMatcher,
    value: &str,
    strategies: &[Strategy],
) -> Option<Resolved> {
    strategies.iter().find_map(|strategy| {
        strategy
            .apply(view, matcher, value)
            .map(|resolution| Resolved {
                strategy: *strategy,
                resolution,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(fragments: &[&str], formatting_children: usize) -> TextView {
        TextView {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            formatting_children,
        }
    }

    fn matcher(column: &str) -> TokenMatcher {
        TokenMatcher::new(&[Delimiters::default()], column).unwrap()
    }

    #[test]
    fn specific_token_wins_over_generic() {
        let resolved = resolve(
            &view(&["{{name}} from {{city}}"], 0),
            &matcher("Name"),
            "Asha",
            &CASCADE,
        )
        .unwrap();
        assert_eq!(resolved.strategy, Strategy::SpecificInMarkup);
        assert_eq!(
            resolved.resolution,
            Resolution::Fragments(vec!["Asha from {{city}}".to_string()])
        );
    }

    #[test]
    fn generic_token_replaced_when_column_differs() {
        let resolved = resolve(&view(&["₹{{amount}}"], 0), &matcher("Price"), "499", &CASCADE)
            .unwrap();
        assert_eq!(resolved.strategy, Strategy::GenericInMarkup);
        assert_eq!(
            resolved.resolution,
            Resolution::Fragments(vec!["₹499".to_string()])
        );
    }

    #[test]
    fn token_split_across_spans_falls_to_plain_text() {
        let resolved = resolve(
            &view(&["Only {{pri", "ce}} today"], 1),
            &matcher("price"),
            "99",
            &CASCADE,
        )
        .unwrap();
        assert_eq!(resolved.strategy, Strategy::SpecificInPlainText);
        assert_eq!(
            resolved.resolution,
            Resolution::Collapse("Only 99 today".to_string())
        );
    }

    #[test]
    fn no_token_overwrites_by_identifier() {
        let single = resolve(&view(&["Static"], 1), &matcher("a"), "New", &CASCADE).unwrap();
        assert_eq!(single.resolution, Resolution::OverwriteChild("New".to_string()));
        let many = resolve(&view(&["A", "B"], 2), &matcher("a"), "New", &CASCADE).unwrap();
        assert_eq!(many.resolution, Resolution::OverwriteAll("New".to_string()));
    }

    #[test]
    fn token_strategies_do_not_overwrite() {
        assert!(resolve(&view(&["Static"], 0), &matcher("a"), "New", &TOKEN_STRATEGIES).is_none());
    }

    #[test]
    fn whitespace_and_case_inside_delimiters() {
        let m = matcher("Price");
        assert!(m.matches_specific("{{ price }}"));
        assert!(!m.matches_specific("{{prices}}"));
        assert!(!m.matches_generic("{{ }}"));
    }

    #[test]
    fn values_are_inserted_literally() {
        assert_eq!(matcher("p").replace_specific("{{p}}", "$1 off"), "$1 off");
    }

    #[test]
    fn custom_delimiters() {
        let m = TokenMatcher::new(
            &[Delimiters::new("${", "}"), Delimiters::new("[[", "]]")],
            "name",
        )
        .unwrap();
        assert_eq!(m.replace_specific("Hi ${name}, [[Name]]!", "Jo"), "Hi Jo, Jo!");
        assert!(m.matches_generic("[[other]]"));
        assert!(!m.matches_generic("{{other}}"));
    }
}
