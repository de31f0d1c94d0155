use serde::{Deserialize, Serialize};

/// The closed set of expense partitions. No category can be added or removed
/// at runtime; every record belongs to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transport,
    Entertainment,
    Shopping,
    Bills,
    Other,
}

impl Category {
    /// Enumeration order. Scan order for `delete` and output order for
    /// `get_all` both follow this array.
    pub const ALL: [Category; 6] = [
        Category::Food,
        Category::Transport,
        Category::Entertainment,
        Category::Shopping,
        Category::Bills,
        Category::Other,
    ];

    /// The lowercase storage key for this category's partition.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Entertainment => "entertainment",
            Category::Shopping => "shopping",
            Category::Bills => "bills",
            Category::Other => "other",
        }
    }

    /// Exact (case-insensitive) match against the fixed category names.
    pub fn parse(name: &str) -> Option<Category> {
        let lower = name.trim().to_lowercase();
        Category::ALL.iter().copied().find(|c| c.as_str() == lower)
    }

    /// Routes a raw category name to its partition through the synonym table.
    ///
    /// Total and deterministic: unknown or absent input maps to `Other`. The
    /// table determines which partition data lands in, so it is part of the
    /// data-portability contract, not an implementation detail.
    pub fn normalize(raw: Option<&str>) -> Category {
        let Some(raw) = raw else {
            return Category::Other;
        };
        let lower = raw.trim().to_lowercase();

        match lower.as_str() {
            "food" | "groceries" | "grocery" | "dining" | "restaurant" | "restaurants"
            | "delivery" | "coffee" | "lunch" | "dinner" | "breakfast" | "snacks" => {
                Category::Food
            }
            "transport" | "transportation" | "uber" | "taxi" | "travel" | "gas" | "fuel"
            | "parking" | "bus" | "train" | "commute" => Category::Transport,
            "entertainment" | "movies" | "movie" | "games" | "gaming" | "music" | "streaming"
            | "concert" | "hobbies" => Category::Entertainment,
            "shopping" | "clothes" | "clothing" | "electronics" | "amazon" | "retail"
            | "gifts" => Category::Shopping,
            "bills" | "bill" | "rent" | "utilities" | "utility" | "insurance"
            | "subscription" | "subscriptions" | "internet" | "phone" | "electricity"
            | "water" => Category::Bills,
            _ => Category::Other,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
