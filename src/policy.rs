use crate::category::Category;
use crate::closet::ClosetCounts;

pub const DEFAULT_CAPACITY: u32 = 50;
pub const DEFAULT_MAX_SHARE_PERCENT: f64 = 25.0;

/// Thresholds for the purchase guards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Closet size at which no further purchase is advised.
    pub capacity: u32,
    /// Largest share, in percent, one category may hold before buying more
    /// of it is discouraged. The comparison is strict.
    pub max_share_percent: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_share_percent: DEFAULT_MAX_SHARE_PERCENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    OverCapacity,
    Skewed { category: Category },
    Bought,
    Unchanged,
}

impl Verdict {
    /// Text shown to the user, if the purchase was blocked.
    pub fn message(&self, limits: &Limits) -> Option<String> {
        match self {
            Verdict::OverCapacity => Some("Too many clothes, don't buy".to_string()),
            Verdict::Skewed { category } => Some(format!(
                "More than {}% of your closet is {}, perhaps focus on building other parts.",
                limits.max_share_percent, category
            )),
            Verdict::Bought | Verdict::Unchanged => None,
        }
    }

    pub fn committed(&self) -> bool {
        matches!(self, Verdict::Bought)
    }
}

/// Applies the guards in order, then commits the purchase when asked to.
///
/// The guards see the closet as loaded; a blocked request never counts
/// toward its own guard.
pub fn apply(counts: &mut ClosetCounts, label: Category, buy: bool, limits: &Limits) -> Verdict {
    if counts.total() >= u64::from(limits.capacity) {
        return Verdict::OverCapacity;
    }

    if counts.percentage(label) > limits.max_share_percent {
        return Verdict::Skewed { category: label };
    }

    if buy {
        counts.increment(label);
        return Verdict::Bought;
    }

    Verdict::Unchanged
}
