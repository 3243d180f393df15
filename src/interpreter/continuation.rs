//! Continuations and their addresses
//!
//! A continuation is stored in the store under a [`KontAddress`] and says what
//! to do with a computed value and where control resumes. Invoking one never
//! runs code by itself: it writes, forks or releases, then hands back states
//! for the transition function (a trampoline).
//!
//! Address 0 is the halt continuation; invoking it ends the task.
//!
//! [`KontAllocator`] decides addresses. The concrete policy hands out fresh
//! ones, so each address holds exactly one continuation. The abstract
//! policies reuse addresses (keyed by resume point, or resume point plus
//! environment) and an address may then hold several continuations, all of
//! which are invoked. Abstract addresses are also keyed by thread, and
//! release continuations by barrier and mode: each simulated thread keeps
//! its own stack, so a worker never resumes where the encountering thread
//! waits for the join.

use super::config::KontAlloc;
use super::control::Control;
use super::omp::{BarrierId, ReleaseMode};
use super::state::ThreadId;
use crate::ast::NodeId;
use crate::memory::environment::FrameId;
use crate::memory::value::{Address, Scalar};
use rustc_hash::FxHashMap;
use std::mem::{discriminant, Discriminant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KontAddress(pub u64);

impl KontAddress {
    pub const HALT: KontAddress = KontAddress(0);

    pub fn is_halt(&self) -> bool {
        *self == KontAddress::HALT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KontKind {
    /// Write the value to every destination (weakly when there are several)
    Assign { dest: Vec<Address>, scalar: Scalar },
    /// Discard the value of a call made as a statement
    Call,
    If {
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While { body: NodeId },
    /// Forward the returned value, converted to the function's return type
    /// when it has one, to the caller's continuation
    Return { scalar: Option<Scalar> },
    /// Leave an OpenMP barrier or critical section
    Release { barrier: BarrierId, mode: ReleaseMode },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    /// Resume point once the continuation is done
    pub ctrl: Control,
    pub env: FrameId,
    pub parent: KontAddress,
    pub kind: KontKind,
}

type KontKey = (
    Control,
    Option<FrameId>,
    Discriminant<KontKind>,
    Option<(BarrierId, ReleaseMode)>,
    ThreadId,
);

#[derive(Debug, Clone)]
pub struct KontAllocator {
    policy: KontAlloc,
    next: u64,
    by_key: FxHashMap<KontKey, KontAddress>,
}

impl KontAllocator {
    pub fn new(policy: KontAlloc) -> Self {
        KontAllocator {
            policy,
            next: 1,
            by_key: FxHashMap::default(),
        }
    }

    /// Whether an address may hold more than one continuation
    pub fn merges(&self) -> bool {
        self.policy != KontAlloc::Concrete
    }

    /// Address for `kont`, pushed by thread `tid`
    pub fn allocate(&mut self, kont: &Continuation, tid: ThreadId) -> KontAddress {
        let release = match kont.kind {
            KontKind::Release { barrier, mode } => Some((barrier, mode)),
            _ => None,
        };
        let key = match self.policy {
            KontAlloc::Concrete => None,
            KontAlloc::ZeroCfa => Some((kont.ctrl, None, discriminant(&kont.kind), release, tid)),
            KontAlloc::P4f => Some((kont.ctrl, Some(kont.env), discriminant(&kont.kind), release, tid)),
        };
        if let Some(key) = key {
            if let Some(&address) = self.by_key.get(&key) {
                return address;
            }
            let address = self.fresh();
            self.by_key.insert(key, address);
            return address;
        }
        self.fresh()
    }

    fn fresh(&mut self) -> KontAddress {
        let address = KontAddress(self.next);
        self.next += 1;
        address
    }
}
