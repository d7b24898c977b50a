use crate::source::Category;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Help,
    Status,
    Retry,
    SelectCategory(Category),
    SelectServer(String),
    /// Zero-based index into the current candidate list.
    SelectSource(usize),
}
