use super::dom::ElementInfo;

pub const MAX_ELEMENT_TEXT_CHARS: usize = 100;

/// One entry of the click allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Tag(&'static str),
    Class(&'static str),
    Attribute(&'static str),
}

impl Selector {
    pub fn matches(&self, element: &ElementInfo) -> bool {
        match self {
            Selector::Tag(tag) => element.tag_name.eq_ignore_ascii_case(tag),
            Selector::Class(class) => element.classes().any(|c| c == *class),
            Selector::Attribute(name) => element.has_attribute(name),
        }
    }
}

/// Elements worth a click event: plain buttons and links, conversion-intent
/// classes, and anything explicitly opted in with `data-track`.
pub const INTERESTING_SELECTORS: &[Selector] = &[
    Selector::Tag("button"),
    Selector::Tag("a"),
    Selector::Class("btn"),
    Selector::Class("cta"),
    Selector::Class("buy-button"),
    Selector::Class("purchase"),
    Selector::Class("checkout"),
    Selector::Class("subscribe"),
    Selector::Class("download"),
    Selector::Attribute("data-track"),
];

pub fn is_interesting(element: &ElementInfo) -> bool {
    INTERESTING_SELECTORS
        .iter()
        .any(|selector| selector.matches(element))
}

/// Nearest element on the propagation path (target first) that matches the
/// allow-list.
pub fn nearest_interesting(path: &[ElementInfo]) -> Option<&ElementInfo> {
    path.iter().find(|element| is_interesting(element))
}

/// `id`, else the class attribute, else `unknown`.
pub fn element_label(element: &ElementInfo) -> String {
    [element.id.as_deref(), element.class_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Trimmed text, cut to the first 100 characters.
pub fn element_text(element: &ElementInfo) -> String {
    truncate_text(element.text_content.as_deref().unwrap_or_default())
}

pub fn truncate_text(text: &str) -> String {
    text.trim().chars().take(MAX_ELEMENT_TEXT_CHARS).collect()
}
