/* Interval algebra over code points. Transition labels in the automata
 * are sets of disjoint character ranges, so a class like [a-zA-Z0-9]
 * stays a single edge instead of one edge per member. */

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A closed interval of code points with `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharRange {
    min: char,
    max: char,
}

impl CharRange {
    /// Returns `None` when `min > max`.
    pub fn new(min: char, max: char) -> Option<Self> {
        if min <= max {
            Some(CharRange { min, max })
        } else {
            None
        }
    }

    pub fn single(ch: char) -> Self {
        CharRange { min: ch, max: ch }
    }

    pub fn min(&self) -> char {
        self.min
    }

    pub fn max(&self) -> char {
        self.max
    }

    pub fn contains(&self, ch: char) -> bool {
        self.min <= ch && ch <= self.max
    }

    pub fn is_single(&self) -> bool {
        self.min == self.max
    }
}

/// Next code point after `ch`, skipping the surrogate gap.
pub(crate) fn succ(ch: char) -> Option<char> {
    let next = match ch as u32 {
        0xD7FF => 0xE000,
        other => other + 1,
    };
    char::from_u32(next)
}

/// Code point before `ch`, skipping the surrogate gap.
pub(crate) fn pred(ch: char) -> Option<char> {
    let prev = match ch as u32 {
        0 => return None,
        0xE000 => 0xD7FF,
        other => other - 1,
    };
    char::from_u32(prev)
}

/// A set of code points held as disjoint ranges in ascending order.
/// Negated character classes are lowered to this positive form before
/// they reach the automata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharRangeSet {
    ranges: Vec<CharRange>,
}

impl CharRangeSet {
    pub fn new() -> Self {
        CharRangeSet { ranges: Vec::new() }
    }

    pub fn from_range(range: CharRange) -> Self {
        CharRangeSet {
            ranges: vec![range],
        }
    }

    pub fn from_char(ch: char) -> Self {
        Self::from_range(CharRange::single(ch))
    }

    /// Merge a range into the set, coalescing overlapping and adjacent
    /// ranges. Inserting a range already covered is a no-op.
    pub fn insert(&mut self, range: CharRange) {
        self.ranges.push(range);
        self.normalize();
    }

    pub fn insert_char(&mut self, ch: char) {
        self.insert(CharRange::single(ch));
    }

    fn normalize(&mut self) {
        self.ranges.sort();
        let mut merged: Vec<CharRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if range.min <= last.max || succ(last.max) == Some(range.min) => {
                    if range.max > last.max {
                        last.max = range.max;
                    }
                }
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.ranges.extend_from_slice(&other.ranges);
        result.normalize();
        result
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let mut result = CharRangeSet::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let a = self.ranges[i];
            let b = other.ranges[j];
            let min = a.min.max(b.min);
            let max = a.max.min(b.max);
            if min <= max {
                result.ranges.push(CharRange { min, max });
            }
            if a.max < b.max {
                i += 1;
            } else {
                j += 1;
            }
        }
        result
    }

    pub fn subtract(&self, other: &Self) -> Self {
        let mut result = CharRangeSet::new();
        for &a in &self.ranges {
            let mut lo = a.min;
            let mut exhausted = false;
            for &b in &other.ranges {
                if b.max < lo {
                    continue;
                }
                if b.min > a.max {
                    break;
                }
                if b.min > lo {
                    // keep the part below the hole
                    if let Some(hi) = pred(b.min) {
                        result.ranges.push(CharRange { min: lo, max: hi });
                    }
                }
                match succ(b.max) {
                    Some(next) if next <= a.max => lo = next,
                    _ => {
                        exhausted = true;
                        break;
                    }
                }
            }
            if !exhausted && lo <= a.max {
                result.ranges.push(CharRange { min: lo, max: a.max });
            }
        }
        result
    }

    pub fn contains(&self, ch: char) -> bool {
        self.ranges
            .binary_search_by(|range| {
                if ch < range.min {
                    std::cmp::Ordering::Greater
                } else if ch > range.max {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[CharRange] {
        &self.ranges
    }

    /// Smallest member of the set.
    pub fn first(&self) -> Option<char> {
        self.ranges.first().map(|range| range.min)
    }
}

/// The alphabet negated classes and `.` are interpreted against:
/// printable ASCII plus tab.
pub fn class_universe() -> CharRangeSet {
    let mut universe = CharRangeSet::new();
    universe.insert(CharRange { min: ' ', max: '~' });
    universe.insert_char('\t');
    universe
}

/// Partition the union of the supplied sets into equivalence classes:
/// each class is fully contained in or fully disjoint from every input
/// set, and two code points land in the same class exactly when the
/// same inputs contain them. Classes come out ordered by their smallest
/// member; code points outside every input are not represented.
pub fn minterms(sets: &[CharRangeSet]) -> Vec<CharRangeSet> {
    let mut cuts: BTreeSet<char> = BTreeSet::new();
    for set in sets {
        for range in set.ranges() {
            cuts.insert(range.min);
            if let Some(next) = succ(range.max) {
                cuts.insert(next);
            }
        }
    }
    let cuts: Vec<char> = cuts.into_iter().collect();

    let mut classes: Vec<CharRangeSet> = Vec::new();
    let mut class_of: HashMap<Vec<usize>, usize> = HashMap::new();
    for (i, &lo) in cuts.iter().enumerate() {
        let hi = match cuts.get(i + 1) {
            // the next cut is strictly above lo, so its predecessor exists
            Some(&next) => pred(next).unwrap_or(lo),
            None => char::MAX,
        };
        let signature: Vec<usize> = sets
            .iter()
            .enumerate()
            .filter(|(_, set)| set.contains(lo))
            .map(|(index, _)| index)
            .collect();
        if signature.is_empty() {
            continue;
        }
        let index = *class_of.entry(signature).or_insert_with(|| {
            classes.push(CharRangeSet::new());
            classes.len() - 1
        });
        classes[index].insert(CharRange { min: lo, max: hi });
    }
    classes
}

fn write_class_char(f: &mut fmt::Formatter<'_>, ch: char) -> fmt::Result {
    match ch {
        '\n' => write!(f, "\\n"),
        '\t' => write!(f, "\\t"),
        '\r' => write!(f, "\\r"),
        '\\' | ']' | '^' | '-' => write!(f, "\\{}", ch),
        ch if (ch as u32) < 0x20 || (ch as u32) == 0x7F => write!(f, "\\x{:02x}", ch as u32),
        ch => write!(f, "{}", ch),
    }
}

impl fmt::Display for CharRangeSet {
    /// Renders in character-class form, e.g. `[a-z0-9_]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for range in &self.ranges {
            write_class_char(f, range.min)?;
            if !range.is_single() {
                write!(f, "-")?;
                write_class_char(f, range.max)?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod char_set_tests {
    use super::*;

    fn range(min: char, max: char) -> CharRange {
        CharRange::new(min, max).unwrap()
    }

    #[test]
    fn test_reversed_range_rejected() {
        assert!(CharRange::new('z', 'a').is_none());
    }

    #[test]
    fn test_insert_coalesces_overlap() {
        let mut set = CharRangeSet::new();
        set.insert(range('a', 'f'));
        set.insert(range('d', 'k'));
        assert_eq!(set.ranges(), &[range('a', 'k')]);
    }

    #[test]
    fn test_insert_coalesces_adjacent() {
        let mut set = CharRangeSet::new();
        set.insert(range('a', 'c'));
        set.insert(range('d', 'f'));
        assert_eq!(set.ranges(), &[range('a', 'f')]);
    }

    #[test]
    fn test_insert_keeps_disjoint_sorted() {
        let mut set = CharRangeSet::new();
        set.insert(range('x', 'z'));
        set.insert(range('a', 'c'));
        set.insert(range('0', '4'));
        assert_eq!(
            set.ranges(),
            &[range('0', '4'), range('a', 'c'), range('x', 'z')]
        );
    }

    #[test]
    fn test_insert_idempotent() {
        let mut set = CharRangeSet::new();
        set.insert(range('a', 'z'));
        set.insert(range('b', 'y'));
        assert_eq!(set.ranges(), &[range('a', 'z')]);
    }

    #[test]
    fn test_contains() {
        let mut set = CharRangeSet::new();
        set.insert(range('a', 'z'));
        set.insert(range('0', '9'));
        assert!(set.contains('m'));
        assert!(set.contains('0'));
        assert!(!set.contains('A'));
        assert!(!set.contains(' '));
    }

    #[test]
    fn test_union() {
        let a = CharRangeSet::from_range(range('a', 'm'));
        let b = CharRangeSet::from_range(range('k', 'z'));
        assert_eq!(a.union(&b).ranges(), &[range('a', 'z')]);
    }

    #[test]
    fn test_intersect() {
        let mut a = CharRangeSet::new();
        a.insert(range('a', 'f'));
        a.insert(range('p', 'z'));
        let b = CharRangeSet::from_range(range('d', 's'));
        assert_eq!(
            a.intersect(&b).ranges(),
            &[range('d', 'f'), range('p', 's')]
        );
    }

    #[test]
    fn test_subtract_splits_range() {
        let a = CharRangeSet::from_range(range('a', 'z'));
        let b = CharRangeSet::from_range(range('g', 'k'));
        assert_eq!(
            a.subtract(&b).ranges(),
            &[range('a', 'f'), range('l', 'z')]
        );
    }

    #[test]
    fn test_subtract_everything() {
        let a = CharRangeSet::from_range(range('d', 'f'));
        let b = CharRangeSet::from_range(range('a', 'z'));
        assert!(a.subtract(&b).is_empty());
    }

    #[test]
    fn test_minterms_disjoint_inputs() {
        let a = CharRangeSet::from_range(range('a', 'f'));
        let b = CharRangeSet::from_range(range('0', '9'));
        let classes = minterms(&[a.clone(), b.clone()]);
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0], b);
        assert_eq!(classes[1], a);
    }

    #[test]
    fn test_minterms_overlap() {
        let a = CharRangeSet::from_range(range('a', 'm'));
        let b = CharRangeSet::from_range(range('g', 'z'));
        let classes = minterms(&[a.clone(), b.clone()]);
        assert_eq!(
            classes,
            vec![
                CharRangeSet::from_range(range('a', 'f')),
                CharRangeSet::from_range(range('g', 'm')),
                CharRangeSet::from_range(range('n', 'z')),
            ]
        );
        // every class is inside or outside each input, never across
        for class in &classes {
            for input in [&a, &b] {
                let inter = class.intersect(input);
                assert!(inter.is_empty() || inter == *class);
            }
        }
    }

    #[test]
    fn test_minterms_groups_equivalent_ranges() {
        // one input set made of two runs collapses into a single class
        let mut a = CharRangeSet::new();
        a.insert(range('a', 'f'));
        a.insert(range('x', 'z'));
        let classes = minterms(&[a.clone()]);
        assert_eq!(classes, vec![a]);
    }

    #[test]
    fn test_display() {
        let mut set = CharRangeSet::new();
        set.insert(range('a', 'z'));
        set.insert_char('_');
        set.insert(range('0', '9'));
        assert_eq!(set.to_string(), "[0-9_a-z]");
    }

    #[test]
    fn test_class_universe() {
        let universe = class_universe();
        assert!(universe.contains('a'));
        assert!(universe.contains(' '));
        assert!(universe.contains('\t'));
        assert!(!universe.contains('\n'));
    }
}
