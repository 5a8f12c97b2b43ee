//! Registry of tiers by category.
//!
//! Loaded once at startup and immutable afterwards. Lookups are total: a
//! category without a configured tier resolves to the most permissive tier,
//! so a misclassified command can never crash admission control.

use crate::domain::tier::{Category, TierConfig, TierError};
use std::collections::BTreeMap;
use std::fmt;

/// Error returned when a catalog cannot be built.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// At least one tier is required
    Empty,
    /// Two tiers were given for the same category
    DuplicateCategory(Category),
    /// A tier failed validation
    Tier(TierError),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Empty => write!(f, "tier catalog must contain at least one tier"),
            CatalogError::DuplicateCategory(c) => {
                write!(f, "duplicate tier for category {}", c)
            }
            CatalogError::Tier(e) => write!(f, "invalid tier: {}", e),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Tier(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TierError> for CatalogError {
    fn from(e: TierError) -> Self {
        CatalogError::Tier(e)
    }
}

/// Tier lookup by category.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: BTreeMap<Category, TierConfig>,
    fallback: TierConfig,
}

impl TierCatalog {
    /// Build a catalog from tiers.
    ///
    /// # Errors
    /// Fails on an empty list, duplicate categories, or any invalid tier.
    pub fn new(tiers: impl IntoIterator<Item = TierConfig>) -> Result<Self, CatalogError> {
        let mut by_category = BTreeMap::new();
        for tier in tiers {
            tier.validate()?;
            let category = tier.category();
            if by_category.insert(category, tier).is_some() {
                return Err(CatalogError::DuplicateCategory(category));
            }
        }

        let fallback = by_category
            .values()
            .max_by(|a, b| a.cmp_permissiveness(b))
            .cloned()
            .ok_or(CatalogError::Empty)?;

        Ok(Self {
            tiers: by_category,
            fallback,
        })
    }

    /// Catalog with the built-in tier for every category.
    pub fn standard() -> Self {
        let tiers: BTreeMap<_, _> = Category::ALL
            .into_iter()
            .map(|c| (c, TierConfig::standard(c)))
            .collect();
        Self {
            fallback: TierConfig::standard(Category::ReadQuery),
            tiers,
        }
    }

    /// Tier for a category; the most permissive tier if none is configured.
    pub fn get_tier(&self, category: Category) -> &TierConfig {
        self.tiers.get(&category).unwrap_or(&self.fallback)
    }

    /// Tier for a raw category name; the most permissive tier if unknown.
    pub fn resolve(&self, name: &str) -> &TierConfig {
        match name.parse::<Category>() {
            Ok(category) => self.get_tier(category),
            Err(_) => &self.fallback,
        }
    }

    /// The tier used for unknown or unconfigured categories.
    pub fn most_permissive(&self) -> &TierConfig {
        &self.fallback
    }

    /// Whether a category has its own tier.
    pub fn contains(&self, category: Category) -> bool {
        self.tiers.contains_key(&category)
    }

    /// Iterate over configured tiers in category order.
    pub fn iter(&self) -> impl Iterator<Item = &TierConfig> {
        self.tiers.values()
    }

    /// Longest time any tier's local bucket needs to refill from empty.
    pub fn slowest_full_refill_seconds(&self) -> f64 {
        self.iter()
            .map(TierConfig::full_refill_seconds)
            .fold(0.0, f64::max)
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
