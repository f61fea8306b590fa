use std::sync::atomic::{AtomicU8, Ordering};

const NOT_STARTED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Shared indicator of whether the background read loop is currently
/// active. Written by the reader task, polled by the supervising loop; a
/// single atomic scalar, deliberately not a lock.
#[derive(Debug, Default)]
pub struct Liveness(AtomicU8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    NotStarted,
    Running,
    Stopped,
}

impl Liveness {
    pub fn new() -> Liveness {
        Liveness(AtomicU8::new(NOT_STARTED))
    }

    pub fn set_running(&self) {
        self.0.store(RUNNING, Ordering::SeqCst);
    }

    pub fn set_stopped(&self) {
        self.0.store(STOPPED, Ordering::SeqCst);
    }

    pub fn state(&self) -> LivenessState {
        match self.0.load(Ordering::SeqCst) {
            RUNNING => LivenessState::Running,
            STOPPED => LivenessState::Stopped,
            _ => LivenessState::NotStarted,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == LivenessState::Running
    }
}
