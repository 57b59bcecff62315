use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceTier {
    #[serde(rename = "top_10_percent")]
    Top,
    #[serde(rename = "average")]
    Average,
    #[serde(rename = "bottom_10_percent")]
    Bottom,
}

impl PerformanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top_10_percent",
            Self::Average => "average",
            Self::Bottom => "bottom_10_percent",
        }
    }
}

/// Size of the top and of the bottom band among `product_count` products.
pub fn band_size(product_count: usize) -> usize {
    (product_count / 10).max(1)
}

/// Tier of the product at `rank` (0 = highest revenue). A rank inside both
/// bands is top.
pub fn tier_for_rank(rank: usize, product_count: usize) -> PerformanceTier {
    let band = band_size(product_count);
    if rank < band {
        PerformanceTier::Top
    } else if rank + band >= product_count {
        PerformanceTier::Bottom
    } else {
        PerformanceTier::Average
    }
}
