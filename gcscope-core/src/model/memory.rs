//! Memory snapshots per generation.
//!
//! Every quantity is optional: `None` means the log never reported it. The
//! arithmetic here treats `None` as contagious for a present item, while a
//! wholly absent item is the identity of [`merge`] and [`subtract`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Young,
    Old,
    Humongous,
    Archive,
    Eden,
    Survivor,
    Metaspace,
    Class,
    NonClass,
    Total,
}

impl Generation {
    pub fn name(self) -> &'static str {
        match self {
            Generation::Young => "Young",
            Generation::Old => "Old",
            Generation::Humongous => "Humongous",
            Generation::Archive => "Archive",
            Generation::Eden => "Eden",
            Generation::Survivor => "Survivor",
            Generation::Metaspace => "Metaspace",
            Generation::Class => "Class",
            Generation::NonClass => "NonClass",
            Generation::Total => "Total",
        }
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One generation's usage before and after an event, in bytes.
///
/// `in_regions` marks items whose numbers are region counts rather than
/// bytes; they stay out of aggregation until converted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub generation: Generation,
    pub pre_used: Option<i64>,
    pub pre_capacity: Option<i64>,
    pub post_used: Option<i64>,
    pub post_capacity: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub in_regions: bool,
}

fn add(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    Some(a? + b?)
}

fn sub(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    Some(a? - b?)
}

impl MemoryItem {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            pre_used: None,
            pre_capacity: None,
            post_used: None,
            post_capacity: None,
            in_regions: false,
        }
    }

    /// Item with used/capacity before and after.
    pub fn with_change(
        generation: Generation,
        pre_used: Option<i64>,
        post_used: Option<i64>,
        post_capacity: Option<i64>,
    ) -> Self {
        Self {
            pre_used,
            post_used,
            post_capacity,
            ..Self::new(generation)
        }
    }

    pub fn regions(mut self) -> Self {
        self.in_regions = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pre_used.is_none()
            && self.pre_capacity.is_none()
            && self.post_used.is_none()
            && self.post_capacity.is_none()
    }

    /// Bytes freed by the event, if both sides are known.
    pub fn reduction(&self) -> Option<i64> {
        sub(self.pre_used, self.post_used)
    }

    /// Field-wise sum. An unknown field on either side stays unknown.
    pub fn plus(&self, other: &MemoryItem) -> MemoryItem {
        MemoryItem {
            generation: self.generation,
            pre_used: add(self.pre_used, other.pre_used),
            pre_capacity: add(self.pre_capacity, other.pre_capacity),
            post_used: add(self.post_used, other.post_used),
            post_capacity: add(self.post_capacity, other.post_capacity),
            in_regions: self.in_regions,
        }
    }

    /// Field-wise difference. An unknown field on either side stays unknown.
    pub fn minus(&self, other: &MemoryItem) -> MemoryItem {
        MemoryItem {
            generation: self.generation,
            pre_used: sub(self.pre_used, other.pre_used),
            pre_capacity: sub(self.pre_capacity, other.pre_capacity),
            post_used: sub(self.post_used, other.post_used),
            post_capacity: sub(self.post_capacity, other.post_capacity),
            in_regions: self.in_regions,
        }
    }

    /// Fill unknown fields from `other`, leaving known fields untouched.
    pub fn fill_unknown(&mut self, other: &MemoryItem) {
        self.pre_used = self.pre_used.or(other.pre_used);
        self.pre_capacity = self.pre_capacity.or(other.pre_capacity);
        self.post_used = self.post_used.or(other.post_used);
        self.post_capacity = self.post_capacity.or(other.post_capacity);
    }

    /// Multiply every known field, used when converting region counts.
    pub fn scaled(&self, factor: i64) -> MemoryItem {
        let scale = |v: Option<i64>| v.map(|v| v * factor);
        MemoryItem {
            generation: self.generation,
            pre_used: scale(self.pre_used),
            pre_capacity: scale(self.pre_capacity),
            post_used: scale(self.post_used),
            post_capacity: scale(self.post_capacity),
            in_regions: false,
        }
    }

    pub fn relabel(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }
}

/// Merge two possibly-absent items. Absence is the identity.
pub fn merge(a: Option<&MemoryItem>, b: Option<&MemoryItem>) -> Option<MemoryItem> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.plus(b)),
        (Some(a), None) => Some(*a),
        (None, Some(b)) => Some(*b),
        (None, None) => None,
    }
}

/// Subtract `b` from `a`. An absent `b` is the identity; an absent `a`
/// gives nothing.
pub fn subtract(a: Option<&MemoryItem>, b: Option<&MemoryItem>) -> Option<MemoryItem> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.minus(b)),
        (Some(a), None) => Some(*a),
        (None, _) => None,
    }
}

/// Per-generation view of an event after roll-up and inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryAggregate {
    items: BTreeMap<Generation, MemoryItem>,
}

impl MemoryAggregate {
    pub fn get(&self, generation: Generation) -> Option<&MemoryItem> {
        self.items.get(&generation)
    }

    pub fn set(&mut self, item: MemoryItem) {
        self.items.insert(item.generation, item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryItem> {
        self.items.values()
    }

    /// Build the aggregate from raw items.
    ///
    /// Byte items of the same generation are merged, eden and survivor
    /// roll into young, class and non-class roll into metaspace, and one
    /// missing side of `young + old + humongous = total` is inferred.
    /// Inference only fills fields that are still unknown.
    pub fn from_raw(raw: &[MemoryItem]) -> Self {
        let mut items: BTreeMap<Generation, MemoryItem> = BTreeMap::new();
        for item in raw.iter().filter(|i| !i.in_regions) {
            let merged = merge(items.get(&item.generation), Some(item));
            if let Some(merged) = merged {
                items.insert(item.generation, merged);
            }
        }

        if !items.contains_key(&Generation::Young) {
            let rolled = merge(
                items.get(&Generation::Eden),
                items.get(&Generation::Survivor),
            );
            if let Some(rolled) = rolled {
                items.insert(Generation::Young, rolled.relabel(Generation::Young));
            }
        }
        if !items.contains_key(&Generation::Metaspace) {
            let rolled = merge(
                items.get(&Generation::Class),
                items.get(&Generation::NonClass),
            );
            if let Some(rolled) = rolled {
                items.insert(Generation::Metaspace, rolled.relabel(Generation::Metaspace));
            }
        }

        let mut aggregate = MemoryAggregate { items };
        aggregate.infer_heap_sides();
        aggregate
    }

    fn infer_heap_sides(&mut self) {
        let humongous = self.items.get(&Generation::Humongous).copied();
        let young = self.items.get(&Generation::Young).copied();
        let old = self.items.get(&Generation::Old).copied();

        if let (Some(y), Some(o)) = (young, old) {
            let sum = merge(merge(Some(&y), Some(&o)).as_ref(), humongous.as_ref());
            if let Some(sum) = sum {
                self.fill(Generation::Total, &sum.relabel(Generation::Total));
            }
        }

        let total = self.items.get(&Generation::Total).copied();
        if let (Some(y), Some(t)) = (young, total) {
            let rest = subtract(subtract(Some(&t), Some(&y)).as_ref(), humongous.as_ref());
            if let Some(rest) = rest {
                self.fill(Generation::Old, &rest.relabel(Generation::Old));
            }
        } else if let (None, Some(o), Some(t)) = (young, old, total) {
            let rest = subtract(subtract(Some(&t), Some(&o)).as_ref(), humongous.as_ref());
            if let Some(rest) = rest {
                self.fill(Generation::Young, &rest.relabel(Generation::Young));
            }
        }
    }

    fn fill(&mut self, generation: Generation, from: &MemoryItem) {
        let entry = self
            .items
            .entry(generation)
            .or_insert_with(|| MemoryItem::new(generation));
        entry.fill_unknown(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: i64 = 1024;

    fn item(g: Generation, pre: i64, post: i64, cap: i64) -> MemoryItem {
        MemoryItem::with_change(g, Some(pre * K), Some(post * K), Some(cap * K))
    }

    #[test]
    fn test_merge_identity() {
        let a = item(Generation::Young, 10, 2, 20);
        assert_eq!(merge(Some(&a), None), Some(a));
        assert_eq!(merge(None, Some(&a)), Some(a));
        assert_eq!(merge(None, None), None);
        assert_eq!(subtract(Some(&a), None), Some(a));
        assert_eq!(subtract(None, Some(&a)), None);
    }

    #[test]
    fn test_unknown_field_is_contagious() {
        let a = item(Generation::Young, 10, 2, 20);
        let mut b = item(Generation::Young, 1, 1, 1);
        b.post_capacity = None;
        let sum = a.plus(&b);
        assert_eq!(sum.pre_used, Some(11 * K));
        assert_eq!(sum.post_capacity, None);
    }

    #[test]
    fn test_eden_survivor_roll_up() {
        let raw = vec![
            item(Generation::Eden, 24, 0, 21),
            item(Generation::Survivor, 0, 3, 3),
        ];
        let agg = MemoryAggregate::from_raw(&raw);
        let young = agg.get(Generation::Young).unwrap();
        assert_eq!(young.pre_used, Some(24 * K));
        assert_eq!(young.post_used, Some(3 * K));
        assert_eq!(young.post_capacity, Some(24 * K));
    }

    #[test]
    fn test_infer_old_from_total() {
        let raw = vec![
            item(Generation::Young, 60, 10, 70),
            item(Generation::Total, 100, 40, 250),
        ];
        let agg = MemoryAggregate::from_raw(&raw);
        let old = agg.get(Generation::Old).unwrap();
        assert_eq!(old.pre_used, Some(40 * K));
        assert_eq!(old.post_used, Some(30 * K));
        assert_eq!(old.post_capacity, Some(180 * K));
    }

    #[test]
    fn test_infer_total_does_not_overwrite_known_fields() {
        let mut total = MemoryItem::new(Generation::Total);
        total.post_used = Some(999 * K);
        let raw = vec![
            item(Generation::Young, 60, 10, 70),
            item(Generation::Old, 40, 30, 180),
            total,
        ];
        let agg = MemoryAggregate::from_raw(&raw);
        let total = agg.get(Generation::Total).unwrap();
        assert_eq!(total.post_used, Some(999 * K));
        assert_eq!(total.pre_used, Some(100 * K));
    }

    #[test]
    fn test_region_items_are_skipped() {
        let raw = vec![item(Generation::Eden, 24, 0, 21).regions()];
        let agg = MemoryAggregate::from_raw(&raw);
        assert!(agg.is_empty());
    }
}
