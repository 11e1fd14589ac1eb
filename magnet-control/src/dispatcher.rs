//! Multi-axis command dispatch
//!
//! Each axis supply is owned by one long-lived worker thread. Commands reach
//! the workers over channels, so the control loop never touches a link
//! directly.
//!
//! Two dispatch paths:
//!
//! - [`Dispatcher::apply`] writes each axis in turn (X, Y, Z), waiting for one
//!   to finish before starting the next. Used for instant setpoints and resets.
//! - [`Dispatcher::dispatch`] synchronizes the axes. Every command is encoded
//!   up front; the workers then write their staging lines in parallel and
//!   report back. Once all axes have staged, they are released together and
//!   each writes its commit line after its own skew delay. Only the commit line
//!   changes the output, so this bounds the cross-axis skew by the commit write
//!   alone.
//!
//! A failure on one axis is reported in the [`DispatchReport`] and never rolls
//! back or blocks the other axes.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use hardware::kepco::{EncodedCommand, FieldCommand, KepcoError, KepcoResult, PowerSupply};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::axis::{Axis, AxisSet};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{axis} axis: {source}")]
    Link {
        axis: Axis,
        #[source]
        source: KepcoError,
    },

    #[error("{0} axis worker is no longer running")]
    WorkerGone(Axis),

    #[error("Failed to spawn {axis} axis worker: {source}")]
    Spawn {
        axis: Axis,
        #[source]
        source: io::Error,
    },
}

/// Per-axis delay before the commit line of a synchronized dispatch.
///
/// The Y supply on the bench answers about 57 ms slower than X and Z, so X and
/// Z are held back by that much by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkewCompensation {
    pub x_ms: u64,
    pub y_ms: u64,
    pub z_ms: u64,
}

impl Default for SkewCompensation {
    fn default() -> Self {
        Self {
            x_ms: 57,
            y_ms: 0,
            z_ms: 57,
        }
    }
}

impl SkewCompensation {
    /// No delay on any axis.
    pub const NONE: Self = Self {
        x_ms: 0,
        y_ms: 0,
        z_ms: 0,
    };

    pub fn delay(&self, axis: Axis) -> Duration {
        let ms = match axis {
            Axis::X => self.x_ms,
            Axis::Y => self.y_ms,
            Axis::Z => self.z_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Outcome of one dispatch: `None` for axes that had no command.
#[derive(Debug, Default)]
pub struct DispatchReport {
    outcomes: AxisSet<Option<Result<(), DispatchError>>>,
}

impl DispatchReport {
    pub fn outcome(&self, axis: Axis) -> Option<&Result<(), DispatchError>> {
        self.outcomes[axis].as_ref()
    }

    /// True if every addressed axis succeeded.
    pub fn is_ok(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Number of axes whose command went out.
    pub fn sent(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Some(Ok(()))))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (Axis, &DispatchError)> {
        self.outcomes.iter().filter_map(|(axis, o)| match o {
            Some(Err(e)) => Some((axis, e)),
            _ => None,
        })
    }

    /// First failure in axis order, for callers that treat any failure as
    /// fatal.
    pub fn into_result(self) -> Result<(), DispatchError> {
        for (_, outcome) in self.outcomes.into_array() {
            if let Some(Err(e)) = outcome {
                return Err(e);
            }
        }
        Ok(())
    }

    fn record(&mut self, axis: Axis, result: Result<(), DispatchError>) {
        if let Err(e) = &result {
            warn!("{e}");
        }
        self.outcomes[axis] = Some(result);
    }
}

enum Job {
    /// Write the whole command through the supply's own buffer.
    Apply {
        command: FieldCommand,
        reply: Sender<KepcoResult<()>>,
    },
    /// Stage, report, wait for release, delay, commit.
    Synchronized {
        command: EncodedCommand,
        delay: Duration,
        staged: Sender<()>,
        release: Receiver<()>,
        reply: Sender<KepcoResult<()>>,
    },
    Shutdown,
}

struct Worker {
    axis: Axis,
    jobs: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(axis: Axis, supply: PowerSupply) -> Result<Self, DispatchError> {
        let (jobs, inbox) = unbounded();
        let handle = thread::Builder::new()
            .name(format!("axis-{axis}"))
            .spawn(move || worker_loop(axis, supply, inbox))
            .map_err(|source| DispatchError::Spawn { axis, source })?;

        Ok(Self {
            axis,
            jobs,
            handle: Some(handle),
        })
    }

    fn submit(&self, job: Job) -> Result<(), DispatchError> {
        self.jobs
            .send(job)
            .map_err(|_| DispatchError::WorkerGone(self.axis))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{} axis worker panicked", self.axis);
            }
        }
    }
}

fn worker_loop(axis: Axis, mut supply: PowerSupply, inbox: Receiver<Job>) {
    debug!("{axis} axis worker started on {}", supply.descriptor());

    for job in inbox.iter() {
        match job {
            Job::Apply { command, reply } => {
                let _ = reply.send(supply.apply(&command));
            }
            Job::Synchronized {
                command,
                delay,
                staged,
                release,
                reply,
            } => {
                let staging = supply.stage(&command);
                let _ = staged.send(());

                // Release is signalled by the dispatcher dropping its sender
                let _ = release.recv();

                let result = staging.and_then(|()| {
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    supply.commit(&command)
                });
                let _ = reply.send(result);
            }
            Job::Shutdown => break,
        }
    }

    debug!("{axis} axis worker stopped");
}

/// Fans commands out to the three axis supplies.
///
/// Dropping the dispatcher stops and joins the workers; the supplies close
/// with them.
pub struct Dispatcher {
    workers: AxisSet<Worker>,
    skew: SkewCompensation,
}

impl Dispatcher {
    /// Start one worker per axis, each taking ownership of its supply.
    pub fn new(
        supplies: AxisSet<PowerSupply>,
        skew: SkewCompensation,
    ) -> Result<Self, DispatchError> {
        let AxisSet { x, y, z } = supplies;
        let x = Worker::spawn(Axis::X, x)?;
        let y = Worker::spawn(Axis::Y, y)?;
        let z = Worker::spawn(Axis::Z, z)?;

        Ok(Self {
            workers: AxisSet { x, y, z },
            skew,
        })
    }

    pub fn skew(&self) -> SkewCompensation {
        self.skew
    }

    /// Write each present command in axis order, one axis at a time.
    pub fn apply(&self, commands: AxisSet<Option<FieldCommand>>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (axis, command) in commands.into_array() {
            let Some(command) = command else {
                continue;
            };
            let result = self.send_one(axis, command);
            report.record(axis, result);
        }

        report
    }

    fn send_one(&self, axis: Axis, command: FieldCommand) -> Result<(), DispatchError> {
        let (reply, response) = bounded(1);
        self.workers[axis].submit(Job::Apply { command, reply })?;
        response
            .recv()
            .map_err(|_| DispatchError::WorkerGone(axis))?
            .map_err(|source| DispatchError::Link { axis, source })
    }

    /// Synchronized dispatch of the present commands; absent axes are left
    /// untouched.
    pub fn dispatch(&self, commands: AxisSet<Option<FieldCommand>>) -> DispatchReport {
        // Encode everything before the first write
        let encoded = commands.map(|_, cmd| cmd.map(|c| c.encode()));
        info!(
            "Synchronized dispatch to {} axes (skew x={}ms y={}ms z={}ms)",
            encoded.count(),
            self.skew.x_ms,
            self.skew.y_ms,
            self.skew.z_ms
        );

        let mut report = DispatchReport::default();
        let (release_tx, release_rx) = bounded::<()>(0);
        let mut pending: Vec<(Axis, Receiver<()>, Receiver<KepcoResult<()>>)> = Vec::new();

        for (axis, command) in encoded.into_array() {
            let Some(command) = command else {
                continue;
            };
            let (staged_tx, staged_rx) = bounded(1);
            let (reply_tx, reply_rx) = bounded(1);
            let job = Job::Synchronized {
                command,
                delay: self.skew.delay(axis),
                staged: staged_tx,
                release: release_rx.clone(),
                reply: reply_tx,
            };
            match self.workers[axis].submit(job) {
                Ok(()) => pending.push((axis, staged_rx, reply_rx)),
                Err(e) => report.record(axis, Err(e)),
            }
        }

        for (axis, staged, _) in &pending {
            if staged.recv().is_err() {
                debug!("{axis} axis worker dropped its staging acknowledgement");
            }
        }

        drop(release_tx);

        for (axis, _, reply) in pending {
            let result = match reply.recv() {
                Ok(result) => result.map_err(|source| DispatchError::Link { axis, source }),
                Err(_) => Err(DispatchError::WorkerGone(axis)),
            };
            report.record(axis, result);
        }

        report
    }

    /// Reset the given axes in order.
    pub fn reset(&self, axes: &[Axis]) -> DispatchReport {
        let mut commands = AxisSet::none();
        for &axis in axes {
            commands[axis] = Some(FieldCommand::Reset);
        }
        self.apply(commands)
    }

    pub fn reset_all(&self) -> DispatchReport {
        self.reset(&Axis::ALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hardware::kepco::{encode_reset, ListWaveform, MockLink};

    fn mock_dispatcher(skew: SkewCompensation) -> (Dispatcher, AxisSet<MockLink>) {
        let links = AxisSet::from_fn(|axis| MockLink::new(axis.to_string()));
        let supplies = links
            .as_ref()
            .map(|axis, link| PowerSupply::with_link(format!("MOCK::{axis}"), link.clone()));
        let dispatcher = Dispatcher::new(supplies, skew).unwrap();
        (dispatcher, links)
    }

    fn instant(current: f64) -> Option<FieldCommand> {
        Some(FieldCommand::Instant {
            current,
            voltage_limit: 20.0,
        })
    }

    fn list(len: usize) -> Option<FieldCommand> {
        Some(
            ListWaveform {
                values: vec![0.5; len],
                voltage_limit: 20.0,
                dwell_s: 0.01,
                repeat_count: 0,
            }
            .into(),
        )
    }

    #[test]
    fn test_apply_writes_present_axes() {
        let (dispatcher, links) = mock_dispatcher(SkewCompensation::NONE);
        let report = dispatcher.apply(AxisSet::new(instant(1.0), instant(0.0), None));

        assert!(report.is_ok());
        assert_eq!(report.sent(), 2);
        assert!(report.outcome(Axis::Z).is_none());
        assert_eq!(
            links.x.lines(),
            vec!["func:mode curr;:curr 1.000;:volt 20.00;:outp on\n"]
        );
        assert_eq!(
            links.y.lines(),
            vec!["func:mode curr;:curr 0.000;:volt 20.00;:outp on\n"]
        );
        assert!(links.z.lines().is_empty());
    }

    #[test]
    fn test_apply_is_sequential_in_axis_order() {
        let (dispatcher, links) = mock_dispatcher(SkewCompensation::NONE);
        dispatcher.apply(AxisSet::new(instant(0.1), instant(0.2), instant(0.3)));

        let x = links.x.writes()[0].at;
        let y = links.y.writes()[0].at;
        let z = links.z.writes()[0].at;
        assert!(x <= y && y <= z);
    }

    #[test]
    fn test_apply_mixes_resets_setpoints_and_lists() {
        let (dispatcher, links) = mock_dispatcher(SkewCompensation::NONE);
        let report =
            dispatcher.apply(AxisSet::new(Some(FieldCommand::Reset), instant(-0.5), list(9)));
        assert_eq!(report.sent(), 3);

        assert_eq!(links.x.lines(), vec!["*rst\n"]);
        assert_eq!(
            links.y.lines(),
            vec!["func:mode curr;:curr -0.50;:volt 20.00;:outp on\n"]
        );
        let z = links.z.lines();
        assert_eq!(z.len(), 4);
        assert_eq!(z.last().unwrap(), "list:coun 0;:outp on;:curr:mode list\n");
    }

    #[test]
    fn test_reset_all_once_per_axis() {
        let (dispatcher, links) = mock_dispatcher(SkewCompensation::NONE);
        assert!(dispatcher.reset_all().is_ok());
        for (_, link) in links.iter() {
            assert_eq!(link.lines(), encode_reset().lines().collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_dispatch_commits_after_all_staging() {
        let skew = SkewCompensation {
            x_ms: 30,
            y_ms: 0,
            z_ms: 10,
        };
        let (dispatcher, links) = mock_dispatcher(skew);
        let report = dispatcher.dispatch(AxisSet::new(list(20), list(20), list(2)));
        assert!(report.is_ok());
        assert_eq!(report.sent(), 3);

        let staged_until = links
            .iter()
            .map(|(_, link)| {
                let writes = link.writes();
                writes[writes.len() - 2].at
            })
            .max()
            .unwrap();

        for (axis, link) in links.iter() {
            let writes = link.writes();
            let commit = writes.last().unwrap();
            assert!(commit.text.ends_with(":curr:mode list\n"));
            assert!(commit.at >= staged_until + skew.delay(axis));
        }
    }

    #[test]
    fn test_dispatch_leaves_absent_axis_untouched() {
        let (dispatcher, links) = mock_dispatcher(SkewCompensation::NONE);
        let report = dispatcher.dispatch(AxisSet::new(list(48), list(48), None));
        assert!(report.is_ok());
        assert_eq!(links.x.lines().len(), 8);
        assert!(links.z.lines().is_empty());
    }

    #[test]
    fn test_failed_axis_does_not_block_others() {
        let (dispatcher, links) = mock_dispatcher(SkewCompensation::NONE);
        links.y.set_failing(true);

        let report = dispatcher.dispatch(AxisSet::new(list(8), list(8), list(2)));
        assert!(!report.is_ok());
        assert_eq!(report.sent(), 2);

        let failures: Vec<Axis> = report.failures().map(|(axis, _)| axis).collect();
        assert_eq!(failures, vec![Axis::Y]);
        assert!(matches!(
            report.outcome(Axis::Y),
            Some(Err(DispatchError::Link { axis: Axis::Y, .. }))
        ));

        // X and Z still staged and committed
        assert_eq!(links.x.lines().len(), 3);
        assert_eq!(links.z.lines().len(), 3);
        assert!(links.y.lines().is_empty());
    }

    #[test]
    fn test_disconnected_axis_reports_not_connected() {
        let links = AxisSet::from_fn(|axis| MockLink::new(axis.to_string()));
        let supplies = AxisSet {
            x: PowerSupply::with_link("MOCK::X", links.x.clone()),
            y: PowerSupply::open(
                "/dev/this-port-does-not-exist",
                &hardware::kepco::LinkOptions::default(),
            )
            .unwrap(),
            z: PowerSupply::with_link("MOCK::Z", links.z.clone()),
        };
        let dispatcher = Dispatcher::new(supplies, SkewCompensation::NONE).unwrap();

        let report = dispatcher.reset_all();
        assert_eq!(report.sent(), 2);
        let err = report.into_result().unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Link {
                axis: Axis::Y,
                source: KepcoError::NotConnected(_)
            }
        ));
        assert_eq!(links.z.lines(), vec!["*rst\n"]);
    }

    #[test]
    fn test_default_skew() {
        let skew = SkewCompensation::default();
        assert_eq!(skew.delay(Axis::X), Duration::from_millis(57));
        assert_eq!(skew.delay(Axis::Y), Duration::ZERO);
        assert_eq!(skew.delay(Axis::Z), Duration::from_millis(57));
    }
}
