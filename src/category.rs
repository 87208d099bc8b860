use std::fmt;

use serde::{Deserialize, Serialize};

/// Clothing classes the model was trained on.
///
/// Declaration order is the model's output order: index `i` of the
/// probability vector is `Category::ALL[i]`. Reordering these variants
/// without retraining the model silently corrupts every prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "dress")]
    Dress,
    #[serde(rename = "longsleeve")]
    Longsleeve,
    #[serde(rename = "outwear")]
    Outwear,
    #[serde(rename = "pants")]
    Pants,
    #[serde(rename = "shirt")]
    Shirt,
    #[serde(rename = "shoes")]
    Shoes,
    #[serde(rename = "shorts")]
    Shorts,
    #[serde(rename = "skirt")]
    Skirt,
    #[serde(rename = "t-shirt")]
    TShirt,
}

impl Category {
    pub const COUNT: usize = 9;

    pub const ALL: [Category; Category::COUNT] = [
        Category::Dress,
        Category::Longsleeve,
        Category::Outwear,
        Category::Pants,
        Category::Shirt,
        Category::Shoes,
        Category::Shorts,
        Category::Skirt,
        Category::TShirt,
    ];

    pub fn from_index(index: usize) -> Option<Category> {
        Category::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Dress => "dress",
            Category::Longsleeve => "longsleeve",
            Category::Outwear => "outwear",
            Category::Pants => "pants",
            Category::Shirt => "shirt",
            Category::Shoes => "shoes",
            Category::Shorts => "shorts",
            Category::Skirt => "skirt",
            Category::TShirt => "t-shirt",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
