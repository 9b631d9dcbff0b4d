use std::collections::BTreeSet;

use chrono::NaiveDate;

/// Hands out `YYMMDD-NNN` shipment ids for one day.
///
/// Suffixes already taken by existing ids are skipped and every id handed
/// out is reserved, so a batch drawn from one generator never repeats.
/// The lowest free suffix is used, so gaps left by removed rows get refilled.
///
/// The existing ids are a snapshot: two generators built from the same
/// sheet read will hand out the same ids.
#[derive(Debug, Clone)]
pub struct ShipmentIdGenerator {
    prefix: String,
    used: BTreeSet<u32>,
}

impl ShipmentIdGenerator {
    pub fn new<I, S>(existing_ids: I, day: NaiveDate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefix = format!("{}-", day.format("%y%m%d"));
        let used = existing_ids
            .into_iter()
            .filter_map(|id| {
                id.as_ref()
                    .strip_prefix(&prefix)
                    .and_then(|suffix| suffix.parse::<u32>().ok())
            })
            .collect();

        Self { prefix, used }
    }

    /// Reserve and return the lowest unused id of the day
    pub fn next_id(&mut self) -> String {
        let suffix = (1..)
            .find(|n| !self.used.contains(n))
            .unwrap_or(u32::MAX);
        self.used.insert(suffix);
        format!("{}{:03}", self.prefix, suffix)
    }
}

/// One-shot form of [`ShipmentIdGenerator::next_id`]
pub fn next_id<I, S>(existing_ids: I, day: NaiveDate) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ShipmentIdGenerator::new(existing_ids, day).next_id()
}
