//! Output categories and profiles

use std::fmt;

use serde::{Deserialize, Serialize};

/// One output bucket, e.g. `vocals` or `drums`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Category(String);

impl Category {
    /// Category names are stored case-folded
    pub fn new(name: impl AsRef<str>) -> Self {
        Category(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Category::new(name)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Category::new(name)
    }
}

/// Ordered, closed set of output categories for one run
///
/// Categories a label table knows about but the profile does not are
/// folded into the profile's catch-all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub categories: Vec<Category>,
    pub catch_all: Category,
}

impl Profile {
    pub fn new(name: impl Into<String>, categories: &[&str], catch_all: &str) -> Self {
        Self {
            name: name.into(),
            categories: categories.iter().map(Category::new).collect(),
            catch_all: Category::new(catch_all),
        }
    }

    /// Vocals/drums/bass/other
    pub fn vdbo() -> Self {
        Self::new("vdbo", &["vocals", "drums", "bass", "other"], "other")
    }

    /// Vocals/drums/bass/guitar/piano/other
    pub fn vdbo_gp() -> Self {
        Self::new(
            "vdbo+gp",
            &["vocals", "drums", "bass", "guitar", "piano", "other"],
            "other",
        )
    }

    pub fn contains(&self, category: &Category) -> bool {
        self.categories.contains(category)
    }

    /// Map any known category onto this profile's closed set
    pub fn fold(&self, category: &Category) -> Category {
        if self.contains(category) {
            category.clone()
        } else {
            self.catch_all.clone()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.categories.is_empty() {
            return Err(format!("profile '{}' has no categories", self.name));
        }
        if !self.contains(&self.catch_all) {
            return Err(format!(
                "profile '{}' catch-all '{}' is not one of its categories",
                self.name, self.catch_all
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for category in &self.categories {
            if !seen.insert(category) {
                return Err(format!(
                    "profile '{}' lists category '{}' twice",
                    self.name, category
                ));
            }
        }
        Ok(())
    }
}
