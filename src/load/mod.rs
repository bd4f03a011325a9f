pub mod calibrate;
pub mod clock;
pub mod duty;
pub mod shape;

use std::sync::Arc;

use crate::config::RunConfig;
use crate::error::Error;

use calibrate::Calibration;
use clock::Clock;
use duty::DutyReport;
use shape::LoadShape;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Calibrating,
    Running,
    Done,
}

/// Result of one worker's run on its cpu.
#[derive(Debug, Clone, Copy)]
pub struct WorkerReport {
    pub cpu: usize,
    pub calibration: Calibration,
    pub duty: DutyReport,
}

/// Drives one already-pinned cpu through calibration and the duty-cycle loop.
pub struct Worker<C: Clock> {
    cpu: usize,
    clock: C,
    config: Arc<RunConfig>,
    shape: LoadShape,
    state: WorkerState,
}

impl<C: Clock> Worker<C> {
    pub fn new(cpu: usize, clock: C, config: Arc<RunConfig>, shape: LoadShape) -> Self {
        Self {
            cpu,
            clock,
            config,
            shape,
            state: WorkerState::Calibrating,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        log::debug!(
            target: "cpuload::worker",
            "cpu {}: {:?} -> {:?}",
            self.cpu,
            self.state(),
            next,
        );
        self.state = next;
    }

    pub fn run(&mut self) -> Result<WorkerReport, Error> {
        let calibration = calibrate::calibrate(&self.clock, self.cpu, &self.config)?;
        self.transition(WorkerState::Running);

        log::info!(
            target: "cpuload::worker",
            "starting workload on cpu {} ({}), lasts for {} seconds...",
            self.cpu,
            self.shape.describe(),
            self.config.timeout_secs,
        );
        let duty = duty::run_duty_cycle(&self.clock, &calibration, &self.shape);
        self.transition(WorkerState::Done);

        Ok(WorkerReport {
            cpu: self.cpu,
            calibration,
            duty,
        })
    }
}
