//! Difference-cover (DC3) suffix-array construction over external memory.
//!
//! The builder is a pure consumer of the pipeline framework: characters
//! flow through tuple builders, external sorters and k-way mergers, and the
//! suffix array comes out as a lazy [`Stream`]. Memory stays bounded by the
//! caller's budget throughout, so texts far larger than RAM sort fine.
//!
//! [`sa_check`] verifies a suffix array against its text in two scans,
//! again as a pipeline.

use crate::{
    block::manager::BlockManager,
    stream::{
        runs::{RunsCreator, RunsMerger, Sorter},
        Choose, Concatenate, Counter, Stream, Zip,
    },
    vector::ExtVec,
};
use std::{cmp::Ordering, sync::Arc};

type Pair = (u64, u64);
type Triple = (u64, u64, u64);
type Quad = (u64, u64, u64, u64);
type Quint = (u64, u64, u64, u64, u64);

type PairCmp = fn(&Pair, &Pair) -> Ordering;
type TripleCmp = fn(&Triple, &Triple) -> Ordering;
type QuadCmp = fn(&Quad, &Quad) -> Ordering;
type QuintCmp = fn(&Quint, &Quint) -> Ordering;

type PairSorter = Sorter<Pair, PairCmp>;

/// Ranks start at 1 so rank 0 can mark "beyond end of input"
const ADD_RANK: u64 = 1;

fn cmp_pair_first(a: &Pair, b: &Pair) -> Ordering {
    a.0.cmp(&b.0)
}

fn cmp_pair_second(a: &Pair, b: &Pair) -> Ordering {
    a.1.cmp(&b.1)
}

fn cmp_triple_first(a: &Triple, b: &Triple) -> Ordering {
    a.0.cmp(&b.0)
}

/// Character-wise order of `(i, t_i, t_{i+1}, t_{i+2})` tuples
fn cmp_quad_chars(a: &Quad, b: &Quad) -> Ordering {
    (a.1, a.2, a.3).cmp(&(b.1, b.2, b.3))
}

/// Order of mod0 quints by `(t_i, ISA[i+1])`
fn cmp_mod0(a: &Quint, b: &Quint) -> Ordering {
    (a.1, a.3).cmp(&(b.1, b.3))
}

/// Order of mod1 quads by rank
fn cmp_mod1(a: &Quad, b: &Quad) -> Ordering {
    a.1.cmp(&b.1)
}

/// Order of mod2 quints by rank
fn cmp_mod2(a: &Quint, b: &Quint) -> Ordering {
    a.1.cmp(&b.1)
}

/// Size of the 2/3 subproblem for a text of length `n`
fn subp_size(n: u64) -> u64 {
    (n / 3) * 2 + u64::from(n % 3 == 2)
}

/// Collects the sliding character window `(i, t_i, t_{i+1}, t_{i+2})` and
/// appends the shifted-up text to `text` as it streams by
///
/// Input characters arrive as `(index, char)` pairs; every emitted
/// character is raised by one so 0 stays free as the end sentinel. For
/// `n % 3 == 1` one zero-character dummy tuple is emitted past the end.
struct MakeQuads<'t, S: Stream<Item = Pair>> {
    input: S,
    text: &'t mut ExtVec<u64>,
    current: Quad,
    counter: u64,
    z3z: u32,
    finished: bool,
}

impl<'t, S: Stream<Item = Pair>> MakeQuads<'t, S> {
    fn new(mut input: S, text: &'t mut ExtVec<u64>) -> crate::Result<Self> {
        assert!(!input.is_empty());

        let mut current: Quad = (0, 0, 0, 0);
        current.1 = input.peek().1 + 1;
        input.advance()?;

        if input.is_empty() {
            current.2 = 0;
            current.3 = 0;
        } else {
            current.2 = input.peek().1 + 1;
            input.advance()?;
        }

        current.3 = if input.is_empty() {
            0
        } else {
            input.peek().1 + 1
        };

        Ok(Self {
            input,
            text,
            current,
            counter: 0,
            z3z: 0,
            finished: false,
        })
    }
}

impl<S: Stream<Item = Pair>> Stream for MakeQuads<'_, S> {
    type Item = Quad;

    fn is_empty(&self) -> bool {
        self.input.is_empty() && self.finished
    }

    fn peek(&self) -> &Quad {
        &self.current
    }

    fn advance(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());

        if self.current.1 != 0 {
            self.text.push(self.current.1)?;
        }

        self.z3z += 1;
        if self.z3z == 3 {
            self.z3z = 0;
        }

        self.counter += 1;
        self.current.0 = self.counter;
        self.current.1 = self.current.2;
        self.current.2 = self.current.3;

        if !self.input.is_empty() {
            self.input.advance()?;
        }

        self.current.3 = if self.input.is_empty() {
            0
        } else {
            self.input.peek().1 + 1
        };

        // only an n % 3 == 1 text lets one dummy tuple through
        if self.current.1 == 0 && self.z3z != 1 {
            self.finished = true;
        }

        Ok(())
    }
}

/// Drops the tuples at positions 0 mod 3 and renumbers the survivors
/// consecutively
struct ExtractMod12<S: Stream<Item = Quad>> {
    input: S,
    counter: u64,
    output_counter: u64,
    result: Quad,
}

impl<S: Stream<Item = Quad>> ExtractMod12<S> {
    fn new(mut input: S) -> crate::Result<Self> {
        assert!(!input.is_empty());

        // skip position 0
        input.advance()?;

        let mut this = Self {
            input,
            counter: 1,
            output_counter: 0,
            result: (0, 0, 0, 0),
        };

        if !this.input.is_empty() {
            this.result = *this.input.peek();
            this.result.0 = this.output_counter;
        }

        Ok(this)
    }
}

impl<S: Stream<Item = Quad>> Stream for ExtractMod12<S> {
    type Item = Quad;

    fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    fn peek(&self) -> &Quad {
        &self.result
    }

    fn advance(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());

        self.input.advance()?;
        self.counter += 1;
        self.output_counter += 1;

        if !self.input.is_empty() && self.counter % 3 == 0 {
            self.input.advance()?;
            self.counter += 1;
        }

        if !self.input.is_empty() {
            self.result = *self.input.peek();
            self.result.0 = self.output_counter;
        }

        Ok(())
    }
}

/// Names character-sorted tuples with ascending lexicographic ranks and
/// detects whether all names are unique
struct Naming<S: Stream<Item = Quad>> {
    input: S,
    unique: bool,
    lexname: u64,
    prev: Quad,
    result: Pair,
}

fn quad_eq(a: &Quad, b: &Quad) -> bool {
    a.1 == b.1 && a.2 == b.2 && a.3 == b.3
}

impl<S: Stream<Item = Quad>> Naming<S> {
    fn new(input: S) -> Self {
        assert!(!input.is_empty());

        let prev = *input.peek();
        Self {
            input,
            unique: true,
            lexname: 0,
            result: (prev.0, 0),
            prev,
        }
    }

    fn unique(&self) -> bool {
        self.unique
    }
}

impl<S: Stream<Item = Quad>> Stream for Naming<S> {
    type Item = Pair;

    fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    fn peek(&self) -> &Pair {
        &self.result
    }

    fn advance(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());

        self.input.advance()?;
        if self.input.is_empty() {
            return Ok(());
        }

        let curr = *self.input.peek();
        if quad_eq(&self.prev, &curr) {
            if curr.1 != 0 {
                self.unique = false;
            }
        } else {
            self.lexname += 1;
        }

        self.result = (curr.0, self.lexname);
        self.prev = curr;

        Ok(())
    }
}

/// Merges the rank-sorted mod0, mod1 and mod2 tuple classes into the final
/// suffix order
///
/// The constructor drains the text and rank streams into three run
/// builders; pulling from the node then merges
/// `(i, t_i, t_{i+1}, ISA[i+1], ISA[i+2])` quints against
/// `(i, ISA[i], t_i, ISA[i+1])` quads with the three-way comparison
/// cascade of the difference-cover construction.
struct BuildSa {
    mod0: RunsMerger<Quint, QuintCmp>,
    mod1: RunsMerger<Quad, QuadCmp>,
    mod2: RunsMerger<Quint, QuintCmp>,

    s0: Quint,
    s1: Quad,
    s2: Quint,
    done: [bool; 3],
    selected: usize,
    result: u64,
}

impl BuildSa {
    fn new<S, S1, S2>(
        mut source: S,
        mut isa1: S1,
        mut isa2: S2,
        a_size: u64,
        memsize: usize,
        manager: &Arc<BlockManager>,
    ) -> crate::Result<Self>
    where
        S: Stream<Item = u64>,
        S1: Stream<Item = u64>,
        S2: Stream<Item = u64>,
    {
        assert!(!source.is_empty());

        let mut mod0_rc =
            RunsCreator::new(Arc::clone(manager), cmp_mod0 as QuintCmp, memsize / 4);
        let mut mod1_rc =
            RunsCreator::new(Arc::clone(manager), cmp_mod1 as QuadCmp, memsize / 4);
        let mut mod2_rc =
            RunsCreator::new(Arc::clone(manager), cmp_mod2 as QuintCmp, memsize / 4);

        let mut t = [0u64; 3];
        let mut old_t2 = 0u64;
        let mut old_mod2 = 0u64;
        let mut mod_one = 0u64;
        let mut mod_two = 0u64;
        let mut index = 0u64;

        while !source.is_empty() {
            let mut exists = [false; 3];

            t[0] = *source.peek();
            source.advance()?;
            exists[0] = true;

            if !source.is_empty() {
                t[1] = *source.peek();
                source.advance()?;
                mod_one = *isa1.peek() + ADD_RANK;
                isa1.advance()?;
                exists[1] = true;
            }

            if !source.is_empty() {
                t[2] = *source.peek();
                source.advance()?;
                mod_two = *isa2.peek() + ADD_RANK;
                isa2.advance()?;
                exists[2] = true;
            }

            debug_assert!(t[0] != 0);

            if exists[2] {
                mod0_rc.push((index, t[0], t[1], mod_one, mod_two))?;
                mod1_rc.push((index + 1, mod_one, t[1], mod_two))?;

                if index != 0 {
                    mod2_rc.push((index - 1, old_mod2, old_t2, t[0], mod_one))?;
                }
            } else if exists[1] {
                mod0_rc.push((index, t[0], t[1], mod_one, 0))?;
                mod1_rc.push((index + 1, mod_one, t[1], 0))?;

                if index != 0 {
                    mod2_rc.push((index - 1, old_mod2, old_t2, t[0], mod_one))?;
                }
            } else {
                mod0_rc.push((index, t[0], 0, 0, 0))?;

                if index != 0 {
                    mod2_rc.push((index - 1, old_mod2, old_t2, t[0], 0))?;
                }
            }

            old_mod2 = mod_two;
            old_t2 = t[2];
            index += 3;
        }

        if a_size % 3 == 0 && index != 0 {
            mod2_rc.push((index - 1, old_mod2, old_t2, 0, 0))?;
        }

        log::debug!(
            "merging S0 = {}, S1 = {}, S2 = {} tuples",
            mod0_rc.len(),
            mod1_rc.len(),
            mod2_rc.len()
        );

        let mod0 = RunsMerger::new(mod0_rc.result()?, cmp_mod0 as QuintCmp, memsize / 5)?;
        let mod1 = RunsMerger::new(mod1_rc.result()?, cmp_mod1 as QuadCmp, memsize / 5)?;
        let mod2 = RunsMerger::new(mod2_rc.result()?, cmp_mod2 as QuintCmp, memsize / 5)?;

        let mut this = Self {
            done: [mod0.is_empty(), mod1.is_empty(), mod2.is_empty()],
            s0: (0, 0, 0, 0, 0),
            s1: (0, 0, 0, 0),
            s2: (0, 0, 0, 0, 0),
            mod0,
            mod1,
            mod2,
            selected: 0,
            result: 0,
        };

        if !this.done[0] {
            this.s0 = *this.mod0.peek();
        }
        if !this.done[1] {
            this.s1 = *this.mod1.peek();
        }
        if !this.done[2] {
            this.s2 = *this.mod2.peek();
        }

        this.merge();
        Ok(this)
    }

    fn cmp_mod1_less_mod2(&self) -> bool {
        self.s1.1 < self.s2.1
    }

    fn cmp_mod0_less_mod2(&self) -> bool {
        if self.s0.1 == self.s2.2 {
            if self.s0.2 == self.s2.3 {
                self.s0.4 < self.s2.4
            } else {
                self.s0.2 < self.s2.3
            }
        } else {
            self.s0.1 < self.s2.2
        }
    }

    fn cmp_mod0_less_mod1(&self) -> bool {
        if self.s0.1 == self.s1.2 {
            self.s0.3 < self.s1.3
        } else {
            self.s0.1 < self.s1.2
        }
    }

    fn merge(&mut self) {
        debug_assert!(!(self.done[0] && self.done[1] && self.done[2]));

        if self.done[0] {
            if self.done[2] || (!self.done[1] && self.cmp_mod1_less_mod2()) {
                self.selected = 1;
                self.result = self.s1.0;
            } else {
                self.selected = 2;
                self.result = self.s2.0;
            }
        } else if self.done[1] || self.cmp_mod0_less_mod1() {
            if self.done[2] || self.cmp_mod0_less_mod2() {
                self.selected = 0;
                self.result = self.s0.0;
            } else {
                self.selected = 2;
                self.result = self.s2.0;
            }
        } else if self.done[2] || self.cmp_mod1_less_mod2() {
            self.selected = 1;
            self.result = self.s1.0;
        } else {
            self.selected = 2;
            self.result = self.s2.0;
        }

        debug_assert!(!self.done[self.selected]);
    }
}

impl Stream for BuildSa {
    type Item = u64;

    fn is_empty(&self) -> bool {
        self.done[0] && self.done[1] && self.done[2]
    }

    fn peek(&self) -> &u64 {
        &self.result
    }

    fn advance(&mut self) -> crate::Result<()> {
        assert!(!self.is_empty());

        match self.selected {
            0 => {
                self.mod0.advance()?;
                if self.mod0.is_empty() {
                    self.done[0] = true;
                } else {
                    self.s0 = *self.mod0.peek();
                }
            }
            1 => {
                self.mod1.advance()?;
                if self.mod1.is_empty() {
                    self.done[1] = true;
                } else {
                    self.s1 = *self.mod1.peek();
                }
            }
            _ => {
                self.mod2.advance()?;
                if self.mod2.is_empty() {
                    self.done[2] = true;
                } else {
                    self.s2 = *self.mod2.peek();
                }
            }
        }

        if !self.is_empty() {
            self.merge();
        }

        Ok(())
    }
}

/// One level of the difference-cover recursion
fn skew<S: Stream<Item = Pair>>(
    input: S,
    ram: usize,
    manager: &Arc<BlockManager>,
    depth: usize,
) -> crate::Result<BuildSa> {
    let mut m1: PairSorter = Sorter::new(Arc::clone(manager), cmp_pair_first, ram / 5);
    let mut m2: PairSorter = Sorter::new(Arc::clone(manager), cmp_pair_first, ram / 5);

    let mut text = ExtVec::<u64>::new(Arc::clone(manager));

    // sort the mod1/mod2 character tuples lexicographically
    let mut quad_sorter: Sorter<Quad, QuadCmp> =
        Sorter::new(Arc::clone(manager), cmp_quad_chars, ram / 5);
    {
        let mut mod12 = ExtractMod12::new(MakeQuads::new(input, &mut text)?)?;
        while !mod12.is_empty() {
            quad_sorter.push(*mod12.peek())?;
            mod12.advance()?;
        }
    }
    quad_sorter.sort()?;

    // name the sorted tuples, splitting names by original parity
    let mut names = Naming::new(quad_sorter);
    let mut concat_len = 0u64;
    while !names.is_empty() {
        let pair = *names.peek();
        if pair.0 & 1 == 1 {
            m2.push(pair)?;
        } else {
            m1.push(pair)?;
        }
        names.advance()?;
        concat_len += 1;
    }
    let unique = names.unique();

    log::debug!("recursion string length = {concat_len}");

    m1.sort()?;
    m2.sort()?;

    if unique {
        log::debug!("unique names at depth {depth}");

        let isa1 = Choose::<_, 1>::new(m1);
        let isa2 = Choose::<_, 1>::new(m2);

        let text_len = text.len() as u64;
        BuildSa::new(text.stream()?, isa1, isa2, text_len, ram, manager)
    } else {
        log::debug!("names not unique, recursing to depth {}", depth + 1);

        // the reduced text is lexname[mod1 positions] . lexname[mod2 positions]
        let reduced = Concatenate::new(m1, m2);
        let rec = skew(reduced, ram, manager, depth + 1)?;

        // (SA12[k], k): position in the reduced string and its rank
        let mut isa_pairs = Zip::new(rec, Counter::new());

        let text_len = text.len() as u64;
        let special = u64::from(concat_len != subp_size(text_len));
        let mod2_pos = (subp_size(text_len) >> 1) + (subp_size(text_len) & 1) + special;

        let mut isa1_pair: PairSorter = Sorter::new(Arc::clone(manager), cmp_pair_first, ram / 5);
        let mut isa2_pair: PairSorter = Sorter::new(Arc::clone(manager), cmp_pair_first, ram / 5);

        while !isa_pairs.is_empty() {
            let pair = *isa_pairs.peek();
            if pair.0 < mod2_pos {
                // the sentinel tuple of an n % 3 == 1 reduction is dropped
                if pair.0 + special < mod2_pos {
                    isa1_pair.push(pair)?;
                }
            } else {
                isa2_pair.push(pair)?;
            }
            isa_pairs.advance()?;
        }
        drop(isa_pairs);

        isa1_pair.finish()?;
        isa2_pair.finish()?;
        isa1_pair.sort_with(ram / 8)?;
        isa2_pair.sort_with(ram / 8)?;

        let isa1 = Choose::<_, 1>::new(isa1_pair);
        let isa2 = Choose::<_, 1>::new(isa2_pair);

        BuildSa::new(text.stream()?, isa1, isa2, text_len, ram, manager)
    }
}

/// Lazy stream of suffix-array positions
pub struct SuffixArray {
    inner: Option<BuildSa>,
}

impl Stream for SuffixArray {
    type Item = u64;

    fn is_empty(&self) -> bool {
        self.inner.as_ref().map_or(true, |sa| sa.is_empty())
    }

    fn peek(&self) -> &u64 {
        self.inner.as_ref().expect("peek on empty stream").peek()
    }

    fn advance(&mut self) -> crate::Result<()> {
        self.inner
            .as_mut()
            .expect("advance on empty stream")
            .advance()
    }
}

/// Builds the suffix array of `input` within `memory` bytes
///
/// The input characters stream in once; the result streams out lazily in
/// suffix order. An empty input yields an empty stream.
///
/// # Errors
///
/// Will return `Err` on allocation exhaustion or I/O failure.
pub fn suffix_array<S: Stream<Item = u64>>(
    input: S,
    memory: usize,
    manager: &Arc<BlockManager>,
) -> crate::Result<SuffixArray> {
    if input.is_empty() {
        return Ok(SuffixArray { inner: None });
    }

    // (i, t_i)
    let pairs = Zip::new(Counter::new(), input);
    let inner = skew(pairs, memory, manager, 0)?;

    Ok(SuffixArray { inner: Some(inner) })
}

/// Verifies that `sa` is the suffix array of `text` within `memory` bytes
///
/// Two passes: the first checks that the array is a permutation of
/// `0..n` while building `(ISA[i], t_i, ISA[i+1])` triples, the second
/// merges the triples back into text order and checks suffix ordering
/// through first characters and successor ranks. A text of length one
/// short-circuits to `true`.
///
/// # Errors
///
/// Will return `Err` on allocation exhaustion or I/O failure.
pub fn sa_check<ST, SA>(
    mut text: ST,
    sa: SA,
    memory: usize,
    manager: &Arc<BlockManager>,
) -> crate::Result<bool>
where
    ST: Stream<Item = u64>,
    SA: Stream<Item = u64>,
{
    // (i, SA[i]) sorted by SA[i] gives (ISA[i], i)
    let index_sa = Zip::new(Counter::new(), sa);
    let mut build_isa = crate::stream::sort::Sort::new(
        Arc::clone(manager),
        index_sa,
        cmp_pair_second as PairCmp,
        memory / 3,
    )?;

    if build_isa.is_empty() {
        return Ok(true);
    }

    let mut triple_rc =
        RunsCreator::new(Arc::clone(manager), cmp_triple_first as TripleCmp, memory / 3);

    let total;
    {
        let mut prev_isa = build_isa.peek().0;
        let mut counter = 0u64;

        while !build_isa.is_empty() {
            if build_isa.peek().1 != counter {
                log::error!("suffix array is not a permutation of 0..n");
                return Ok(false);
            }

            counter += 1;
            build_isa.advance()?;

            if !build_isa.is_empty() {
                triple_rc.push((prev_isa, *text.peek(), build_isa.peek().0))?;
                prev_isa = build_isa.peek().0;
            }

            if !text.is_empty() {
                text.advance()?;
            }
        }

        total = counter;
    }

    if total == 1 {
        return Ok(true);
    }

    let mut triple_rm =
        RunsMerger::new(triple_rc.result()?, cmp_triple_first as TripleCmp, memory / 3)?;

    let mut prev = *triple_rm.peek();
    let mut counter = 0u64;
    triple_rm.advance()?;

    while !triple_rm.is_empty() {
        let this = *triple_rm.peek();

        if prev.1 > this.1 {
            log::error!("suffix array position {counter} ordered incorrectly");
            return Ok(false);
        }

        if prev.1 == this.1 {
            if this.2 == total {
                // the last suffix must come first among equal first characters
                log::error!("suffix array position {counter} ordered incorrectly");
                return Ok(false);
            }
            if prev.2 != total && prev.2 > this.2 {
                log::error!("suffix array position {counter} ordered incorrectly");
                return Ok(false);
            }
        }

        prev = this;
        triple_rm.advance()?;
        counter += 1;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        stream::{streamify, StreamIter},
        Config,
    };
    use test_log::test;

    fn manager() -> Arc<BlockManager> {
        Config::memory(1 << 24)
            .block_size(128)
            .open()
            .expect("should open")
    }

    fn naive_sa(text: &[u8]) -> Vec<u64> {
        let mut sa: Vec<u64> = (0..text.len() as u64).collect();
        sa.sort_by_key(|i| &text[*i as usize..]);
        sa
    }

    fn built_sa(text: &[u8], manager: &Arc<BlockManager>) -> crate::Result<Vec<u64>> {
        let input = streamify(text.iter().map(|c| u64::from(*c)));
        let sa = suffix_array(input, 1 << 16, manager)?;
        StreamIter(sa).collect()
    }

    #[test]
    fn matches_naive_reference() -> crate::Result<()> {
        let manager = manager();

        for text in [
            &b"yabbadabbado"[..],
            b"a",
            b"ab",
            b"ba",
            b"aaa",
            b"abracadabra",
            b"mississippi",
            b"banana",
            b"abcabcabcabcabcabc",
        ] {
            assert_eq!(
                naive_sa(text),
                built_sa(text, &manager)?,
                "wrong suffix array for {:?}",
                std::str::from_utf8(text)
            );
        }

        Ok(())
    }

    #[test]
    fn unary_text_sorts_by_descending_position() -> crate::Result<()> {
        let manager = manager();

        let sa = built_sa(&[b'a'; 100], &manager)?;
        let expected: Vec<u64> = (0..100).rev().collect();
        assert_eq!(expected, sa);

        Ok(())
    }

    #[test]
    fn checker_accepts_correct_and_rejects_wrong() -> crate::Result<()> {
        let manager = manager();
        let text = b"yabbadabbado";

        let sa = built_sa(text, &manager)?;
        let ok = sa_check(
            streamify(text.iter().map(|c| u64::from(*c))),
            streamify(sa.clone()),
            1 << 16,
            &manager,
        )?;
        assert!(ok);

        // swap two entries: still a permutation, no longer sorted
        let mut broken = sa;
        broken.swap(0, 1);
        let ok = sa_check(
            streamify(text.iter().map(|c| u64::from(*c))),
            streamify(broken),
            1 << 16,
            &manager,
        )?;
        assert!(!ok);

        Ok(())
    }

    #[test]
    fn checker_short_circuits_single_character() -> crate::Result<()> {
        let manager = manager();

        let ok = sa_check(
            streamify([42u64]),
            streamify([0u64]),
            1 << 16,
            &manager,
        )?;
        assert!(ok);

        Ok(())
    }

    #[test]
    fn empty_input_is_empty() -> crate::Result<()> {
        let manager = manager();

        let sa = suffix_array(streamify(Vec::<u64>::new()), 1 << 16, &manager)?;
        assert!(sa.is_empty());

        Ok(())
    }

    #[test]
    fn random_texts_verify() {
        let manager = manager();

        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(0xDC3);

        for len in [2usize, 3, 4, 5, 13, 40, 200] {
            let text: Vec<u8> = (0..len).map(|_| rng.gen_range(b'a'..=b'd')).collect();
            let sa = built_sa(&text, &manager).expect("should build");
            assert_eq!(
                naive_sa(&text),
                sa,
                "wrong suffix array for {:?}",
                String::from_utf8_lossy(&text)
            );
        }
    }
}
