//! Learning rate schedule: linear warmup, then linear / cosine / constant decay.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Decay mode after warmup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LrDecay {
    Linear,
    Cosine,
    Constant,
}

#[derive(Clone, Debug)]
pub struct LrScheduler {
    step: usize,
    lr: f64,
    warmup_steps: usize,
    max_steps: usize,
    decay: LrDecay,
}

impl LrScheduler {
    pub fn new(lr: f64, warmup_steps: usize, max_steps: usize, decay: LrDecay) -> Self {
        Self {
            step: 0,
            lr,
            warmup_steps,
            max_steps,
            decay,
        }
    }

    /// Warmup length: explicit steps win; otherwise a ratio of the run.
    pub fn resolve_warmup(warmup_steps: usize, warmup_ratio: f64, max_steps: usize) -> usize {
        if warmup_steps > 0 {
            warmup_steps
        } else {
            (warmup_ratio * max_steps as f64).ceil() as usize
        }
    }

    /// Learning rate for the optimiser step about to be taken.
    pub fn current_lr(&self) -> f64 {
        let step = self.step;

        // Warmup phase: linear ramp from 0 towards lr.
        if step < self.warmup_steps {
            return self.lr * step as f64 / self.warmup_steps as f64;
        }

        if self.max_steps == 0 || self.decay == LrDecay::Constant {
            return self.lr;
        }

        let decay_steps = self.max_steps.saturating_sub(self.warmup_steps).max(1);
        let progress = ((step - self.warmup_steps) as f64 / decay_steps as f64).min(1.0);

        match self.decay {
            LrDecay::Linear => self.lr * (1.0 - progress),
            LrDecay::Cosine => 0.5 * self.lr * (1.0 + (std::f64::consts::PI * progress).cos()),
            LrDecay::Constant => self.lr,
        }
    }

    pub fn advance(&mut self) {
        self.step += 1;
    }

    pub fn step(&self) -> usize {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_to(sched: &mut LrScheduler, step: usize) {
        while sched.step() < step {
            sched.advance();
        }
    }

    #[test]
    fn lr_warmup() {
        let mut sched = LrScheduler::new(1e-3, 100, 1000, LrDecay::Linear);
        assert_eq!(sched.current_lr(), 0.0);
        advance_to(&mut sched, 50);
        assert!((sched.current_lr() - 5e-4).abs() < 1e-12);
        advance_to(&mut sched, 100);
        assert!((sched.current_lr() - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn lr_linear_decay_reaches_zero() {
        let mut sched = LrScheduler::new(1e-3, 100, 1100, LrDecay::Linear);
        advance_to(&mut sched, 600);
        assert!((sched.current_lr() - 5e-4).abs() < 1e-12);
        advance_to(&mut sched, 1100);
        assert!(sched.current_lr().abs() < 1e-15);
        advance_to(&mut sched, 1200);
        assert!(sched.current_lr().abs() < 1e-15);
    }

    #[test]
    fn lr_cosine_midpoint() {
        let mut sched = LrScheduler::new(1e-3, 0, 1000, LrDecay::Cosine);
        advance_to(&mut sched, 500);
        assert!((sched.current_lr() - 5e-4).abs() < 1e-9);
    }

    #[test]
    fn lr_constant() {
        let mut sched = LrScheduler::new(1e-3, 0, 1000, LrDecay::Constant);
        advance_to(&mut sched, 500);
        assert!((sched.current_lr() - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn warmup_resolution() {
        assert_eq!(LrScheduler::resolve_warmup(500, 0.1, 1000), 500);
        assert_eq!(LrScheduler::resolve_warmup(0, 0.1, 1001), 101);
        assert_eq!(LrScheduler::resolve_warmup(0, 0.0, 1000), 0);
    }
}
