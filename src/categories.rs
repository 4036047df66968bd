use crate::constants::DEFAULT_CATEGORY_ID;
use crate::models::Category;

pub const DEFAULT_CATEGORIES: [Category; 8] = [
    category("1", "Food", "food", "#FF6B6B"),
    category("2", "Transport", "car", "#4ECDC4"),
    category("3", "Bills", "file-document", "#45B7D1"),
    category("4", "Shopping", "shopping", "#96CEB4"),
    category("5", "Entertainment", "movie", "#FFEEAD"),
    category("6", "Health", "medical-bag", "#D4EE9F"),
    category("7", "Education", "school", "#FFD93D"),
    category("8", "Other", "dots-horizontal", "#95A5A6"),
];

const fn category(
    id: &'static str,
    name: &'static str,
    icon: &'static str,
    color: &'static str,
) -> Category {
    Category {
        id,
        name,
        icon: Some(icon),
        color: Some(color),
    }
}

pub fn default_category() -> Category {
    DEFAULT_CATEGORIES
        .iter()
        .copied()
        .find(|c| c.id == DEFAULT_CATEGORY_ID)
        .unwrap_or(DEFAULT_CATEGORIES[DEFAULT_CATEGORIES.len() - 1])
}

/// Matches an expense's loose category reference by id or by name (case-insensitive).
pub fn find_category(value: &str) -> Option<Category> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DEFAULT_CATEGORIES
        .iter()
        .copied()
        .find(|c| c.id == value || c.name.eq_ignore_ascii_case(value))
}

/// Never fails: unknown or missing references fall back to the default category.
pub fn resolve_category(value: Option<&str>) -> Category {
    value.and_then(find_category).unwrap_or_else(default_category)
}
