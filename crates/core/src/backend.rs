//! Collision search backends
//!
//! Every backend searches one final SHA-1 block: the caller has already
//! compressed all earlier blocks into `iv` and placed the `0x80` terminator
//! and length trailer. The backend only rewrites the counter region, the
//! last [`COUNTER_WIDTH`] meaningful bytes before `tail_len`.
//!
//! Variants are listed from most portable to most specialized; the engine
//! relies on that order when picking a default.

use crate::alphabet::Alphabet;
use crate::params::{BLOCK_SIZE, COUNTER_WIDTH, DIGEST_WORDS, MAX_TAIL};
use crate::primitives::{
    Lanes4, Word, feed_forward, leading_zero_words, load_words, precompute_rounds, rounds_from,
    sha1_compress,
};

#[cfg(target_arch = "x86_64")]
cpufeatures::new!(cpuid_sse2, "sse2");

/// A registered collision search routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// One reference compression per candidate
    PortableCompact,
    /// Scalar rounds with the invariant prefix rounds computed once
    PortableStandard,
    /// Four candidates per pass in plain `[u32; 4]` lanes
    WordParallel,
    /// Four candidates per pass in SSE2 registers
    Sse2,
}

impl Backend {
    /// Fixed registration order
    pub const ALL: [Backend; 4] = [
        Backend::PortableCompact,
        Backend::PortableStandard,
        Backend::WordParallel,
        Backend::Sse2,
    ];

    /// Index of the first backend that is not a plain scalar routine
    pub const FIRST_SPECIALIZED: usize = 2;

    pub fn name(self) -> &'static str {
        match self {
            Backend::PortableCompact => "Portable Compact 1-pipe",
            Backend::PortableStandard => "Portable Standard 1-pipe",
            Backend::WordParallel => "Portable Word-Parallel 4-pipe",
            Backend::Sse2 => "x86-64 SSE2 Standard 4-pipe",
        }
    }

    /// Alphabet the counter region is written in
    pub fn alphabet(self) -> Alphabet {
        match self {
            Backend::PortableCompact => Alphabet::HexLower,
            Backend::PortableStandard | Backend::WordParallel | Backend::Sse2 => Alphabet::Base64,
        }
    }

    /// Whether this backend can run on the current CPU
    pub fn probe(self) -> bool {
        match self {
            Backend::PortableCompact | Backend::PortableStandard | Backend::WordParallel => true,
            Backend::Sse2 => sse2_available(),
        }
    }

    /// Search the counter space of one prepared block.
    ///
    /// Stops at the first candidate with at least `target_bits` leading zero
    /// bits, or after `max_iterations` candidates (clamped to what the
    /// alphabet can encode). The returned bit count always belongs to the
    /// candidate left in `block`: the winner, or the best one seen.
    pub fn search(
        self,
        target_bits: u32,
        block: &mut [u8; BLOCK_SIZE],
        iv: &[u32; DIGEST_WORDS],
        tail_len: usize,
        max_iterations: u64,
    ) -> u32 {
        if !(COUNTER_WIDTH..=MAX_TAIL).contains(&tail_len) {
            return 0;
        }
        let limit = max_iterations.min(self.alphabet().capacity());
        if limit == 0 {
            return 0;
        }

        let job = Job {
            target_bits,
            iv,
            tail_len,
            limit,
            alphabet: self.alphabet(),
        };

        match self {
            Backend::PortableCompact => search_compact(&job, block),
            Backend::PortableStandard => search_standard(&job, block),
            Backend::WordParallel => search_lanes::<Lanes4>(&job, block, |l| l, |v| v),
            Backend::Sse2 => search_sse2(&job, block),
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn sse2_available() -> bool {
    cpuid_sse2::get()
}

#[cfg(not(target_arch = "x86_64"))]
fn sse2_available() -> bool {
    false
}

struct Job<'a> {
    target_bits: u32,
    iv: &'a [u32; DIGEST_WORDS],
    tail_len: usize,
    limit: u64,
    alphabet: Alphabet,
}

impl Job<'_> {
    fn counter_offset(&self) -> usize {
        self.tail_len - COUNTER_WIDTH
    }

    /// Message words touched by the counter region
    fn variable_words(&self) -> core::ops::RangeInclusive<usize> {
        self.counter_offset() / 4..=(self.tail_len - 1) / 4
    }

    fn write_counter(&self, block: &mut [u8; BLOCK_SIZE], value: u64) {
        let mut digits = [0u8; COUNTER_WIDTH];
        self.alphabet.encode(value, &mut digits);
        let at = self.counter_offset();
        block[at..at + COUNTER_WIDTH].copy_from_slice(&digits);
    }
}

/// Best candidate seen so far, committed on exhaustion
#[derive(Default)]
struct Best {
    bits: u32,
    value: u64,
}

impl Best {
    #[inline(always)]
    fn offer(&mut self, bits: u32, value: u64) {
        if bits > self.bits {
            self.bits = bits;
            self.value = value;
        }
    }

    fn commit(self, job: &Job<'_>, block: &mut [u8; BLOCK_SIZE]) -> u32 {
        job.write_counter(block, self.value);
        self.bits
    }
}

fn search_compact(job: &Job<'_>, block: &mut [u8; BLOCK_SIZE]) -> u32 {
    let mut best = Best::default();

    for n in 0..job.limit {
        job.write_counter(block, n);
        let mut state = *job.iv;
        sha1_compress(&mut state, block);

        let bits = leading_zero_words(&state);
        if bits >= job.target_bits {
            return bits;
        }
        best.offer(bits, n);
    }

    best.commit(job, block)
}

fn search_standard(job: &Job<'_>, block: &mut [u8; BLOCK_SIZE]) -> u32 {
    let first = *job.variable_words().start();
    let mut w = load_words(block);
    let fixed = precompute_rounds(job.iv, &w, first);
    let mut best = Best::default();

    for n in 0..job.limit {
        job.write_counter(block, n);
        let fresh = load_words(block);
        for i in job.variable_words() {
            w[i] = fresh[i];
        }

        let mut state = fixed;
        let mut window = w;
        rounds_from(&mut state, &mut window, first);
        feed_forward(&mut state, job.iv);

        let bits = leading_zero_words(&state);
        if bits >= job.target_bits {
            return bits;
        }
        best.offer(bits, n);
    }

    best.commit(job, block)
}

/// Four candidates per pass; `load`/`store` move lanes in and out of `W`.
#[inline(always)]
fn search_lanes<W: Word>(
    job: &Job<'_>,
    block: &mut [u8; BLOCK_SIZE],
    load: impl Fn([u32; 4]) -> W,
    store: impl Fn(W) -> [u32; 4],
) -> u32 {
    let variable = job.variable_words();
    let first = *variable.start();
    let base_words = load_words(block);
    let fixed = precompute_rounds(job.iv, &base_words, first).map(W::splat);
    let mut lane_blocks = [*block; 4];
    let mut best = Best::default();

    let mut n = 0u64;
    while n < job.limit {
        let mut lane_words = [[0u32; 16]; 4];
        for (lane, lane_block) in lane_blocks.iter_mut().enumerate() {
            job.write_counter(lane_block, n + lane as u64);
            lane_words[lane] = load_words(lane_block);
        }

        let mut window = base_words.map(W::splat);
        for i in variable.clone() {
            window[i] = load([
                lane_words[0][i],
                lane_words[1][i],
                lane_words[2][i],
                lane_words[3][i],
            ]);
        }

        let mut state = fixed;
        rounds_from(&mut state, &mut window, first);
        feed_forward(&mut state, job.iv);
        let lanes = state.map(&store);

        for lane in 0..4 {
            let value = n + lane as u64;
            if value >= job.limit {
                break;
            }
            let words: [u32; DIGEST_WORDS] = core::array::from_fn(|k| lanes[k][lane]);
            let bits = leading_zero_words(&words);
            if bits >= job.target_bits {
                job.write_counter(block, value);
                return bits;
            }
            best.offer(bits, value);
        }

        n += 4;
    }

    best.commit(job, block)
}

#[cfg(target_arch = "x86_64")]
fn search_sse2(job: &Job<'_>, block: &mut [u8; BLOCK_SIZE]) -> u32 {
    #[target_feature(enable = "sse2")]
    unsafe fn run(job: &Job<'_>, block: &mut [u8; BLOCK_SIZE]) -> u32 {
        use crate::primitives::sse2::Sse2x4;
        search_lanes::<Sse2x4>(job, block, Sse2x4::from_lanes, Sse2x4::to_lanes)
    }

    if !sse2_available() {
        return 0;
    }
    // SAFETY: the runtime probe above confirmed SSE2 support
    unsafe { run(job, block) }
}

#[cfg(not(target_arch = "x86_64"))]
fn search_sse2(_job: &Job<'_>, _block: &mut [u8; BLOCK_SIZE]) -> u32 {
    0
}
