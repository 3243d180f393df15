// Machine states

use super::continuation::KontAddress;
use super::control::Control;
use super::omp::BarrierId;
use crate::memory::environment::FrameId;
use std::fmt;

/// Simulated OpenMP thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub const MASTER: ThreadId = ThreadId(0);
}

/// One task's position: control, environment and continuation. The store
/// is shared by every state of a run and lives in the machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct State {
    pub ctrl: Control,
    pub env: FrameId,
    pub kont: KontAddress,
    pub tid: ThreadId,
    /// Set while the task waits on a barrier or lock
    pub barrier: Option<BarrierId>,
}

impl State {
    pub fn new(ctrl: Control, env: FrameId, kont: KontAddress, tid: ThreadId) -> Self {
        State {
            ctrl,
            env,
            kont,
            tid,
            barrier: None,
        }
    }

    pub fn with_ctrl(&self, ctrl: Control) -> State {
        State {
            ctrl,
            barrier: None,
            ..self.clone()
        }
    }

    pub fn waiting_on(mut self, barrier: BarrierId) -> State {
        self.barrier = Some(barrier);
        self
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[tid {} {:?} env {} kont {}]",
            self.tid.0, self.ctrl, self.env.0, self.kont.0
        )?;
        if let Some(barrier) = self.barrier {
            write!(f, " waiting on {:?}", barrier)?;
        }
        Ok(())
    }
}
