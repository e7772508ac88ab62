use anyhow::anyhow;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::model::Category;
use crate::remote::RemoteError;

/// The user's categories, looked up case-insensitively. Creation goes
/// through `resolve_or_create` so repeated input within a session selects
/// the same category instead of creating duplicates.
#[derive(Debug, Default)]
pub struct CategoryBook {
    categories: Vec<Category>,
}

impl CategoryBook {
    pub fn new(mut categories: Vec<Category>) -> Self {
        categories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Self { categories }
    }

    pub fn all(&self) -> &[Category] {
        &self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Category> {
        self.categories.iter().find(|cat| cat.id == id)
    }

    /// Display name for a category reference; null references render as the
    /// uncategorized sentinel and dangling ones as unknown.
    pub fn display_name(&self, id: Option<Uuid>) -> &str {
        match id {
            None => "Uncategorized",
            Some(id) => self
                .get(id)
                .map(|cat| cat.name.as_str())
                .unwrap_or("Unknown"),
        }
    }

    pub fn find_case_insensitive(&self, name: &str) -> Option<&Category> {
        let needle = name.trim().to_lowercase();
        self.categories
            .iter()
            .find(|cat| cat.name.to_lowercase() == needle)
    }

    /// Select the category matching `name` under case-folding, or create it
    /// through `create` and select the created row. `create` receives the
    /// trimmed name and must return the authoritative row — including the
    /// existing row when the remote reports a duplicate.
    #[instrument(skip(self, create))]
    pub fn resolve_or_create<F>(&mut self, name: &str, create: F) -> anyhow::Result<Uuid>
    where
        F: FnOnce(&str) -> Result<Category, RemoteError>,
    {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("category name is empty"));
        }

        if let Some(existing) = self.find_case_insensitive(trimmed) {
            debug!(name = trimmed, id = %existing.id, "selected existing category");
            return Ok(existing.id);
        }

        let created = create(trimmed)?;
        let id = created.id;
        debug!(name = trimmed, %id, "created and selected category");
        self.insert(created);
        Ok(id)
    }

    pub fn insert(&mut self, category: Category) {
        if self.categories.iter().any(|cat| cat.id == category.id) {
            return;
        }
        self.categories.push(category);
        self.categories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Category> {
        let position = self.categories.iter().position(|cat| cat.id == id)?;
        Some(self.categories.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::CategoryBook;
    use crate::model::{Category, DEFAULT_CATEGORY_COLOR};

    fn category(name: &str) -> Category {
        Category {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            name: name.to_string(),
            color: Some(DEFAULT_CATEGORY_COLOR.to_string()),
            created_at: Utc
                .with_ymd_and_hms(2026, 3, 2, 12, 0, 0)
                .single()
                .expect("valid time"),
        }
    }

    #[test]
    fn resolve_is_idempotent_within_a_session() {
        let mut book = CategoryBook::new(vec![]);
        let creations = Cell::new(0u32);

        let create = |name: &str| {
            creations.set(creations.get() + 1);
            Ok(category(name))
        };
        let first = book.resolve_or_create("Deep Work", create).expect("created");

        let create = |name: &str| {
            creations.set(creations.get() + 1);
            Ok(category(name))
        };
        let second = book.resolve_or_create("deep work", create).expect("selected");

        assert_eq!(first, second);
        assert_eq!(creations.get(), 1);
        assert_eq!(book.all().len(), 1);
    }

    #[test]
    fn lookup_folds_case_and_trims() {
        let existing = category("Reading");
        let id = existing.id;
        let mut book = CategoryBook::new(vec![existing]);

        let resolved = book
            .resolve_or_create("  rEaDiNg  ", |_| panic!("must not create"))
            .expect("selected existing");
        assert_eq!(resolved, id);
    }

    #[test]
    fn empty_names_are_rejected() {
        let mut book = CategoryBook::new(vec![]);
        assert!(
            book.resolve_or_create("   ", |_| panic!("must not create"))
                .is_err()
        );
    }

    #[test]
    fn display_name_uses_the_uncategorized_sentinel() {
        let existing = category("Writing");
        let id = existing.id;
        let book = CategoryBook::new(vec![existing]);

        assert_eq!(book.display_name(Some(id)), "Writing");
        assert_eq!(book.display_name(None), "Uncategorized");
        assert_eq!(book.display_name(Some(Uuid::new_v4())), "Unknown");
    }
}
