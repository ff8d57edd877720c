//! Bloom filter for blacklist pre-screening
//!
//! A fixed-size bit array with `k` probe positions per key, derived by double
//! hashing two 64-bit FNV-1a variants (Kirsch–Mitzenmacher). The filter only
//! answers "definitely absent" or "maybe present"; it never reports a member
//! as absent.
//!
//! ```text
//! probe_i(key) = (h1(key) + i * h2(key)) mod m      for i in 0..k
//! ```

/// FNV-1a 64-bit offset basis
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
/// Alternate basis for the second hash
const FNV_OFFSET_ALT: u64 = 0x8422_2325_cbf2_9ce4;
/// FNV-1a 64-bit prime
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Smallest bit array we allocate, so an empty blacklist still has a valid filter
const MIN_BITS: usize = 64;

/// Probabilistic set membership over byte strings
#[derive(Debug, Clone)]
pub struct BloomFilter {
    words: Vec<u64>,
    bits: u64,
    hashes: u32,
}

impl BloomFilter {
    /// Create a filter with `bits` bits and `hashes` probes per key
    ///
    /// `bits` is rounded up to a multiple of 64 and at least 64; `hashes`
    /// is at least 1.
    #[must_use]
    pub fn new(bits: usize, hashes: u32) -> Self {
        let bits = bits.max(MIN_BITS).div_ceil(64) * 64;
        Self {
            words: vec![0; bits / 64],
            bits: bits as u64,
            hashes: hashes.max(1),
        }
    }

    /// Insert a key
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..u64::from(self.hashes) {
            let bit = self.probe(h1, h2, i);
            self.words[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// Test a key: `false` means definitely absent, `true` means maybe present
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        (0..u64::from(self.hashes)).all(|i| {
            let bit = self.probe(h1, h2, i);
            self.words[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    /// Number of bits in the filter
    #[must_use]
    pub fn bit_len(&self) -> u64 {
        self.bits
    }

    /// Number of probes per key
    #[must_use]
    pub fn hash_count(&self) -> u32 {
        self.hashes
    }

    /// Memory used by the bit array
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    /// Estimated false positive rate after `inserted` insertions: (1 - e^(-kn/m))^k
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimated_fp_rate(&self, inserted: usize) -> f64 {
        let k = f64::from(self.hashes);
        let n = inserted as f64;
        let m = self.bits as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    #[inline]
    fn probe(&self, h1: u64, h2: u64, i: u64) -> u64 {
        h1.wrapping_add(i.wrapping_mul(h2)) % self.bits
    }
}

#[inline]
fn fnv1a(basis: u64, bytes: &[u8]) -> u64 {
    let mut h = basis;
    for &b in bytes {
        h ^= u64::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// splitmix64 finalizer, spreads FNV's weak low bits
#[inline]
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[inline]
fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h1 = mix(fnv1a(FNV_OFFSET, key));
    // odd step so successive probes do not collapse onto one bit
    let h2 = mix(fnv1a(FNV_OFFSET_ALT, key)) | 1;
    (h1, h2)
}
