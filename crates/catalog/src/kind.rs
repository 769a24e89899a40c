use serde::{Deserialize, Serialize};

/// The "named entity with slug" kinds.
///
/// Categories, trademarks and brands share one shape (id, unique name,
/// derived slug) and one service; the kind only decides storage location,
/// labels and which records depend on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedKind {
    Category,
    Trademark,
    Brand,
}

impl NamedKind {
    pub const ALL: [NamedKind; 3] = [NamedKind::Category, NamedKind::Trademark, NamedKind::Brand];

    /// Key under which a record of this kind appears in an envelope.
    pub fn entity_key(self) -> &'static str {
        match self {
            NamedKind::Category => "category",
            NamedKind::Trademark => "trademark",
            NamedKind::Brand => "brand",
        }
    }

    /// Capitalized label used in messages.
    pub fn label(self) -> &'static str {
        match self {
            NamedKind::Category => "Category",
            NamedKind::Trademark => "Trademark",
            NamedKind::Brand => "Brand",
        }
    }

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            NamedKind::Category => "categories",
            NamedKind::Trademark => "trademarks",
            NamedKind::Brand => "brands",
        }
    }
}

impl core::fmt::Display for NamedKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.entity_key())
    }
}
