//! The worklist: a deterministic queue of syntax nodes pending another
//! `hm`/`val` visit. A nonzero seed permutes pop order, for the confluence
//! tests only.

use crate::syntax::SynId;
use std::collections::{HashSet, VecDeque};

#[derive(Debug)]
pub struct Work {
    q: VecDeque<SynId>,
    on: HashSet<SynId>,
    seed: u64,
}

impl Work {
    pub fn new(seed: u64) -> Work {
        Work {
            q: VecDeque::new(),
            on: HashSet::new(),
            seed,
        }
    }

    pub fn add(&mut self, s: SynId) {
        if self.on.insert(s) {
            self.q.push_back(s);
        }
    }

    pub fn add_all<I: IntoIterator<Item = SynId>>(&mut self, it: I) {
        for s in it {
            self.add(s);
        }
    }

    pub fn pop(&mut self) -> Option<SynId> {
        if self.q.is_empty() {
            return None;
        }
        let idx = if self.seed == 0 {
            0
        } else {
            // xorshift; any stable scramble will do
            self.seed ^= self.seed << 13;
            self.seed ^= self.seed >> 7;
            self.seed ^= self.seed << 17;
            (self.seed % self.q.len() as u64) as usize
        };
        let s = self.q.remove(idx).unwrap();
        self.on.remove(&s);
        Some(s)
    }

    pub fn on(&self, s: SynId) -> bool {
        self.on.contains(&s)
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}
