//! Seeded permutation tables shared by every noise evaluation of a pass.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Number of distinct lattice hashes.
pub const PERMUTATION_SIZE: usize = 256;

/// Classic reference permutation, used when no seed is requested.
const STANDARD: [u8; PERMUTATION_SIZE] = [
    151, 160, 137, 91, 90, 15, 131, 13, 201, 95, 96, 53, 194, 233, 7, 225, 140, 36, 103, 30, 69,
    142, 8, 99, 37, 240, 21, 10, 23, 190, 6, 148, 247, 120, 234, 75, 0, 26, 197, 62, 94, 252, 219,
    203, 117, 35, 11, 32, 57, 177, 33, 88, 237, 149, 56, 87, 174, 20, 125, 136, 171, 168, 68, 175,
    74, 165, 71, 134, 139, 48, 27, 166, 77, 146, 158, 231, 83, 111, 229, 122, 60, 211, 133, 230,
    220, 105, 92, 41, 55, 46, 245, 40, 244, 102, 143, 54, 65, 25, 63, 161, 1, 216, 80, 73, 209, 76,
    132, 187, 208, 89, 18, 169, 200, 196, 135, 130, 116, 188, 159, 86, 164, 100, 109, 198, 173,
    186, 3, 64, 52, 217, 226, 250, 124, 123, 5, 202, 38, 147, 118, 126, 255, 82, 85, 212, 207, 206,
    59, 227, 47, 16, 58, 17, 182, 189, 28, 42, 223, 183, 170, 213, 119, 248, 152, 2, 44, 154, 163,
    70, 221, 153, 101, 155, 167, 43, 172, 9, 129, 22, 39, 253, 19, 98, 108, 110, 79, 113, 224, 232,
    178, 185, 112, 104, 218, 246, 97, 228, 251, 34, 242, 193, 238, 210, 144, 12, 191, 179, 162,
    241, 81, 51, 145, 235, 249, 14, 239, 107, 49, 192, 214, 31, 181, 199, 106, 157, 184, 84, 204,
    176, 115, 121, 50, 45, 127, 4, 150, 254, 138, 236, 205, 93, 222, 114, 67, 29, 24, 72, 243, 141,
    128, 195, 78, 66, 215, 61, 156, 180,
];

/// A doubled 256-entry permutation so lattice hashes never need wrapping.
///
/// Tables are immutable once built. Regeneration builds a fresh table and
/// swaps the owning `Arc`, so readers never observe a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationTable {
    perm: Box<[u8; PERMUTATION_SIZE * 2]>,
}

impl PermutationTable {
    /// Builds the classic reference table.
    pub fn standard() -> Self {
        Self::from_base(&STANDARD)
    }

    /// Builds a table shuffled deterministically from `seed`.
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::from_rng(&mut rng)
    }

    /// Builds a table by shuffling with an existing generator.
    pub fn from_rng(rng: &mut ChaCha8Rng) -> Self {
        let mut base = [0u8; PERMUTATION_SIZE];
        for (i, slot) in base.iter_mut().enumerate() {
            *slot = i as u8;
        }
        base.shuffle(rng);
        Self::from_base(&base)
    }

    fn from_base(base: &[u8; PERMUTATION_SIZE]) -> Self {
        let mut perm = Box::new([0u8; PERMUTATION_SIZE * 2]);
        for i in 0..PERMUTATION_SIZE * 2 {
            perm[i] = base[i % PERMUTATION_SIZE];
        }
        Self { perm }
    }

    /// Hash lookup; `index` must be below 512.
    #[inline]
    pub fn hash(&self, index: usize) -> usize {
        self.perm[index] as usize
    }

    /// The 256 base entries, in the order uploaded to a backend.
    pub fn entries(&self) -> Vec<u32> {
        self.perm[..PERMUTATION_SIZE].iter().map(|&v| v as u32).collect()
    }

    /// Rebuilds a table from uploaded entries.
    ///
    /// Returns `None` unless `entries` is a permutation of 0..256.
    pub fn from_entries(entries: &[u32]) -> Option<Self> {
        if entries.len() != PERMUTATION_SIZE {
            return None;
        }
        let mut seen = [false; PERMUTATION_SIZE];
        let mut base = [0u8; PERMUTATION_SIZE];
        for (slot, &value) in base.iter_mut().zip(entries) {
            let value = usize::try_from(value).ok().filter(|&v| v < PERMUTATION_SIZE)?;
            if seen[value] {
                return None;
            }
            seen[value] = true;
            *slot = value as u8;
        }
        Some(Self::from_base(&base))
    }
}

impl Default for PermutationTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_table_is_permutation() {
        let table = PermutationTable::new(15);
        let mut entries = table.entries();
        entries.sort_unstable();
        let expected: Vec<u32> = (0..256).collect();
        assert_eq!(entries, expected, "Shuffled table must contain every hash once");
    }

    #[test]
    fn test_seeded_table_reproducible() {
        assert_eq!(PermutationTable::new(7), PermutationTable::new(7));
        assert_ne!(
            PermutationTable::new(7),
            PermutationTable::new(8),
            "Different seeds should shuffle differently"
        );
    }

    #[test]
    fn test_doubled_lookup_wraps() {
        let table = PermutationTable::new(3);
        for i in 0..PERMUTATION_SIZE {
            assert_eq!(table.hash(i), table.hash(i + PERMUTATION_SIZE));
        }
    }

    #[test]
    fn test_entries_round_trip() {
        let table = PermutationTable::new(99);
        let rebuilt = PermutationTable::from_entries(&table.entries());
        assert_eq!(rebuilt, Some(table));
    }

    #[test]
    fn test_from_entries_rejects_duplicates() {
        let mut entries: Vec<u32> = (0..256).collect();
        entries[10] = 11;
        assert!(PermutationTable::from_entries(&entries).is_none());
        assert!(PermutationTable::from_entries(&entries[..100]).is_none());
    }
}
