//! Limits on the search effort.
//!
//! Limits are polled between nodes; a breach finishes the current node and
//! stops the loop with a partial status. The interrupt limit installs a
//! global Ctrl-C handler and can only be constructed once per process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Which limit fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TimeLimit,
    NodeLimit,
    SolutionLimit,
    DepthLimit,
    Interrupted,
}

/// Progress counters polled by the limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub nb_nodes: usize,
    pub nb_solutions: usize,
}

pub trait Limit {
    fn initialize(&mut self) {}

    fn exceeded(&mut self, stats: &SearchStats) -> Option<StopReason>;
}

/// Stops after a wall-clock budget in seconds.
pub struct TimeLimit {
    max_seconds: f64,
    start: Instant,
}

impl TimeLimit {
    pub fn new(max_seconds: f64) -> Self {
        Self {
            max_seconds,
            start: Instant::now(),
        }
    }
}

impl Limit for TimeLimit {
    fn initialize(&mut self) {
        self.start = Instant::now();
    }

    fn exceeded(&mut self, _stats: &SearchStats) -> Option<StopReason> {
        if self.start.elapsed().as_secs_f64() >= self.max_seconds {
            Some(StopReason::TimeLimit)
        } else {
            None
        }
    }
}

/// Stops after a number of processed nodes.
pub struct NodeLimit {
    max_nodes: usize,
}

impl NodeLimit {
    pub fn new(max_nodes: usize) -> Self {
        Self { max_nodes }
    }
}

impl Limit for NodeLimit {
    fn exceeded(&mut self, stats: &SearchStats) -> Option<StopReason> {
        if stats.nb_nodes >= self.max_nodes {
            Some(StopReason::NodeLimit)
        } else {
            None
        }
    }
}

/// Stops after a number of accepted solutions.
pub struct SolutionLimit {
    max_solutions: usize,
}

impl SolutionLimit {
    pub fn new(max_solutions: usize) -> Self {
        Self { max_solutions }
    }
}

impl Limit for SolutionLimit {
    fn exceeded(&mut self, stats: &SearchStats) -> Option<StopReason> {
        if stats.nb_solutions >= self.max_solutions {
            Some(StopReason::SolutionLimit)
        } else {
            None
        }
    }
}

/// Responds to Ctrl-C (SIGINT) or programmatic interrupts.
///
/// Only one instance can be constructed per process, as it installs a
/// global signal handler; creating more than one will panic.
pub struct InterruptLimit {
    interrupted: Arc<AtomicBool>,
}

impl InterruptLimit {
    pub fn new() -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        ctrlc::set_handler({
            let interrupted = interrupted.clone();
            move || {
                interrupted.store(true, Ordering::SeqCst);
            }
        })
        .expect("error setting the Ctrl-C handler");
        Self { interrupted }
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

impl Limit for InterruptLimit {
    fn exceeded(&mut self, _stats: &SearchStats) -> Option<StopReason> {
        if self.interrupted.load(Ordering::SeqCst) {
            Some(StopReason::Interrupted)
        } else {
            None
        }
    }
}

/// Combines limits and fires with the first that triggers.
pub struct MultipleLimits {
    limits: Vec<Box<dyn Limit>>,
}

impl MultipleLimits {
    pub fn new(limits: Vec<Box<dyn Limit>>) -> Self {
        Self { limits }
    }

    pub fn push(&mut self, limit: Box<dyn Limit>) {
        self.limits.push(limit);
    }
}

impl Limit for MultipleLimits {
    fn initialize(&mut self) {
        for l in &mut self.limits {
            l.initialize();
        }
    }

    fn exceeded(&mut self, stats: &SearchStats) -> Option<StopReason> {
        for l in &mut self.limits {
            if let Some(reason) = l.exceeded(stats) {
                return Some(reason);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_and_solution_limits() {
        let mut l = MultipleLimits::new(vec![
            Box::new(NodeLimit::new(10)),
            Box::new(SolutionLimit::new(2)),
        ]);
        let mut stats = SearchStats::default();
        assert!(l.exceeded(&stats).is_none());
        stats.nb_solutions = 2;
        assert_eq!(l.exceeded(&stats), Some(StopReason::SolutionLimit));
        stats.nb_solutions = 0;
        stats.nb_nodes = 10;
        assert_eq!(l.exceeded(&stats), Some(StopReason::NodeLimit));
    }

    #[test]
    fn test_time_limit() {
        let mut l = TimeLimit::new(0.0);
        l.initialize();
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert_eq!(
            l.exceeded(&SearchStats::default()),
            Some(StopReason::TimeLimit)
        );
    }
}
