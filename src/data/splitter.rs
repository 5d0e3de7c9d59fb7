// ============================================================
// Layer 4 — Stratified Train/Validation Splitter
// ============================================================
// Splits records into training and validation partitions so
// that each relation label keeps (approximately) the same share
// in both partitions.
//
// Why stratify?
//   KLUE-RE is heavily imbalanced: no_relation alone is about a
//   third of the data while some labels have a few dozen
//   examples. A plain shuffle can leave rare labels out of the
//   validation set entirely, which zeroes their AUPRC.
//
// Algorithm (per split):
//   1. n_test  = ceil(test_size * n), n_train = n - n_test
//   2. Allocate n_train across classes proportionally to class
//      size; floor first, then hand the remaining draws to the
//      classes with the largest fractional parts (random ties)
//   3. Allocate n_test the same way over what is left
//   4. Shuffle each class, take its train then test quota
//   5. Shuffle both index lists
//
// Repeating the split n_splits times with one RNG and keeping
// the last partition matches the behaviour of looping over a
// shuffle-split generator.
//
// Reference: rand crate documentation (SliceRandom)

use std::collections::BTreeMap;

use rand::{seq::SliceRandom, Rng};

use crate::domain::error::DataError;

/// Train and validation index lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test:  Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct StratifiedShuffleSplit {
    n_splits:  usize,
    test_size: f64,
}

impl StratifiedShuffleSplit {
    pub fn new(n_splits: usize, test_size: f64) -> Result<Self, DataError> {
        if n_splits == 0 {
            return Err(DataError::Split("n_splits must be at least 1".into()));
        }
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(DataError::Split(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }
        Ok(Self { n_splits, test_size })
    }

    /// Generate `n_splits` independent partitions of `labels`.
    pub fn splits<K: Ord, R: Rng>(
        &self,
        labels: &[K],
        rng:    &mut R,
    ) -> Result<Vec<SplitIndices>, DataError> {
        let n      = labels.len();
        let n_test = (self.test_size * n as f64).ceil() as usize;
        let n_train = n.saturating_sub(n_test);

        // Group example indices by class, classes in sorted order
        let mut by_class: BTreeMap<&K, Vec<usize>> = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(i);
        }
        let groups: Vec<Vec<usize>> = by_class.into_values().collect();
        let n_classes = groups.len();

        if let Some(min) = groups.iter().map(Vec::len).min() {
            if min < 2 {
                return Err(DataError::Split(
                    "the least populated class has only 1 member; every class needs at least 2".into(),
                ));
            }
        }
        if n_train < n_classes {
            return Err(DataError::Split(format!(
                "train partition of {n_train} is smaller than the {n_classes} classes"
            )));
        }
        if n_test < n_classes {
            return Err(DataError::Split(format!(
                "validation partition of {n_test} is smaller than the {n_classes} classes"
            )));
        }

        let class_counts: Vec<usize> = groups.iter().map(Vec::len).collect();

        let mut out = Vec::with_capacity(self.n_splits);
        for _ in 0..self.n_splits {
            let train_quota = approximate_mode(&class_counts, n_train, rng);
            let remaining: Vec<usize> = class_counts
                .iter()
                .zip(&train_quota)
                .map(|(c, t)| c - t)
                .collect();
            let test_quota = approximate_mode(&remaining, n_test, rng);

            let mut train = Vec::with_capacity(n_train);
            let mut test  = Vec::with_capacity(n_test);
            for (k, group) in groups.iter().enumerate() {
                let mut members = group.clone();
                members.shuffle(rng);
                train.extend_from_slice(&members[..train_quota[k]]);
                test.extend_from_slice(&members[train_quota[k]..train_quota[k] + test_quota[k]]);
            }
            train.shuffle(rng);
            test.shuffle(rng);
            out.push(SplitIndices { train, test });
        }
        Ok(out)
    }

    /// Run every split and keep the last one.
    pub fn last_split<K: Ord, R: Rng>(
        &self,
        labels: &[K],
        rng:    &mut R,
    ) -> Result<SplitIndices, DataError> {
        let mut splits = self.splits(labels, rng)?;
        splits
            .pop()
            .ok_or_else(|| DataError::Split("no split produced".into()))
    }
}

/// Distribute `n_draws` over classes proportionally to `class_counts`,
/// never exceeding a class's count.
fn approximate_mode<R: Rng>(class_counts: &[usize], n_draws: usize, rng: &mut R) -> Vec<usize> {
    let total: usize = class_counts.iter().sum();
    if total == 0 {
        return vec![0; class_counts.len()];
    }

    let continuous: Vec<f64> = class_counts
        .iter()
        .map(|&c| c as f64 * n_draws as f64 / total as f64)
        .collect();
    let mut floored: Vec<usize> = continuous.iter().map(|x| x.floor() as usize).collect();
    let mut need = n_draws.saturating_sub(floored.iter().sum());

    if need > 0 {
        // Largest fractional part first, ties broken at random
        let mut order: Vec<usize> = (0..class_counts.len()).collect();
        order.shuffle(rng);
        order.sort_by(|&a, &b| {
            let ra = continuous[a] - floored[a] as f64;
            let rb = continuous[b] - floored[b] as f64;
            rb.total_cmp(&ra)
        });
        for k in order {
            if need == 0 {
                break;
            }
            if floored[k] < class_counts[k] {
                floored[k] += 1;
                need -= 1;
            }
        }
    }
    floored
}

/// Move `items` into two partitions according to `split`.
pub fn partition<T>(items: Vec<T>, split: &SplitIndices) -> (Vec<T>, Vec<T>) {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut take = |idx: &[usize]| -> Vec<T> {
        idx.iter().filter_map(|&i| slots.get_mut(i).and_then(Option::take)).collect()
    };
    let train = take(&split.train);
    let test  = take(&split.test);

    tracing::debug!("Dataset split: {} training, {} validation", train.len(), test.len());
    (train, test)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::seed::SeedContext;

    fn labels() -> Vec<&'static str> {
        // 60 × a, 30 × b, 10 × c
        let mut v = vec!["a"; 60];
        v.extend(vec!["b"; 30]);
        v.extend(vec!["c"; 10]);
        v
    }

    fn count(labels: &[&str], idx: &[usize], class: &str) -> usize {
        idx.iter().filter(|&&i| labels[i] == class).count()
    }

    #[test]
    fn test_split_sizes_and_strata() {
        let labels = labels();
        let mut rng = SeedContext::new(42).rng(0);
        let split = StratifiedShuffleSplit::new(1, 0.1).unwrap().last_split(&labels, &mut rng).unwrap();

        assert_eq!(split.train.len(), 90);
        assert_eq!(split.test.len(), 10);
        assert_eq!(count(&labels, &split.test, "a"), 6);
        assert_eq!(count(&labels, &split.test, "b"), 3);
        assert_eq!(count(&labels, &split.test, "c"), 1);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let labels = labels();
        let mut rng = SeedContext::new(1).rng(0);
        let split = StratifiedShuffleSplit::new(3, 0.25).unwrap().last_split(&labels, &mut rng).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let labels = labels();
        let splitter = StratifiedShuffleSplit::new(2, 0.2).unwrap();
        let a = splitter.last_split(&labels, &mut SeedContext::new(9).rng(0)).unwrap();
        let b = splitter.last_split(&labels, &mut SeedContext::new(9).rng(0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_singleton_class_is_rejected() {
        let labels = vec!["a", "a", "a", "b"];
        let err = StratifiedShuffleSplit::new(1, 0.5)
            .unwrap()
            .last_split(&labels, &mut SeedContext::new(0).rng(0))
            .unwrap_err();
        assert!(matches!(err, DataError::Split(_)));
    }

    #[test]
    fn test_test_size_out_of_range() {
        assert!(StratifiedShuffleSplit::new(1, 0.0).is_err());
        assert!(StratifiedShuffleSplit::new(1, 1.0).is_err());
        assert!(StratifiedShuffleSplit::new(0, 0.1).is_err());
    }

    #[test]
    fn test_partition_moves_items() {
        let items = vec!["x", "y", "z", "w"];
        let split = SplitIndices { train: vec![3, 0], test: vec![2] };
        let (train, test) = partition(items, &split);
        assert_eq!(train, vec!["w", "x"]);
        assert_eq!(test, vec!["z"]);
    }

    #[test]
    fn test_approximate_mode_sums_to_draws() {
        let mut rng = SeedContext::new(3).rng(0);
        let quota = approximate_mode(&[5, 5, 5], 7, &mut rng);
        assert_eq!(quota.iter().sum::<usize>(), 7);
        assert!(quota.iter().all(|&q| q == 2 || q == 3));
    }
}
