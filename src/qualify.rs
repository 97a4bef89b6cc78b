//! Day-one device qualification pipeline.
//!
//! Each device runs the same ordered check sequence: backup the running
//! config, verify CDP, record software/hardware inventory, then configure and
//! verify NTP. A connect failure aborts the remaining checks for that device
//! but never affects any other device; teardown always runs once a session
//! exists.

use std::fmt::Display;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    FleetProbeError, cisco,
    session::{DeviceSession, SessionError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdpStatus {
    On,
    Off,
}

impl Display for CdpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CdpStatus::On => write!(f, "ON"),
            CdpStatus::Off => write!(f, "OFF"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Sync,
    Unsync,
}

impl Display for ClockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockState::Sync => write!(f, "sync"),
            ClockState::Unsync => write!(f, "unsync"),
        }
    }
}

/// Performance-Encryption vs No-Performance-Encryption image classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageClass {
    Pe,
    Npe,
}

impl Display for ImageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageClass::Pe => write!(f, "PE"),
            ImageClass::Npe => write!(f, "NPE"),
        }
    }
}

/// One device's qualification record, mutated additively by each step.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReport {
    pub name: String,
    pub hardware: Option<String>,
    pub software: Option<String>,
    pub image_class: ImageClass,
    pub cdp_status: CdpStatus,
    pub neighbor_count: usize,
    pub clock_state: ClockState,
}

impl DeviceReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hardware: None,
            software: None,
            image_class: ImageClass::Pe,
            cdp_status: CdpStatus::Off,
            neighbor_count: 0,
            clock_state: ClockState::Unsync,
        }
    }
}

impl Display for DeviceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}; {}; {}; {}; CDP is {}, {} peers; Clock is {}",
            self.name,
            self.hardware.as_deref().unwrap_or("unknown"),
            self.software.as_deref().unwrap_or("unknown"),
            self.image_class,
            self.cdp_status,
            self.neighbor_count,
            self.clock_state
        )
    }
}

/// Steps of the per-device test sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    Backup,
    Cdp,
    Software,
    Ntp,
    Disconnect,
}

impl Step {
    /// The step following this one in the fixed sequence.
    pub fn next(self) -> Option<Step> {
        match self {
            Step::Connect => Some(Step::Backup),
            Step::Backup => Some(Step::Cdp),
            Step::Cdp => Some(Step::Software),
            Step::Software => Some(Step::Ntp),
            Step::Ntp => Some(Step::Disconnect),
            Step::Disconnect => None,
        }
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Connect => write!(f, "connect"),
            Step::Backup => write!(f, "backup"),
            Step::Cdp => write!(f, "cdp"),
            Step::Software => write!(f, "software"),
            Step::Ntp => write!(f, "ntp"),
            Step::Disconnect => write!(f, "disconnect"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Passed(String),
    Failed(String),
    Errored(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: StepOutcome,
}

/// Everything one device's run produced: the report plus per-step outcomes.
#[derive(Debug, Clone)]
pub struct DeviceOutcome {
    pub report: DeviceReport,
    pub steps: Vec<StepRecord>,
}

impl DeviceOutcome {
    fn new(name: &str) -> Self {
        Self {
            report: DeviceReport::new(name),
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Passed(note) => info!("{}: {} passed: {}", self.report.name, step, note),
            StepOutcome::Failed(reason) => {
                warn!("{}: {} failed: {}", self.report.name, step, reason)
            }
            StepOutcome::Errored(reason) => {
                warn!("{}: {} errored: {}", self.report.name, step, reason)
            }
            StepOutcome::Skipped => debug!("{}: {} skipped", self.report.name, step),
        }
        self.steps.push(StepRecord { step, outcome });
    }

    pub fn step_outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|record| record.step == step)
            .map(|record| &record.outcome)
    }
}

/// Run parameters shared by every device worker in a qualification run.
#[derive(Debug, Clone)]
pub struct QualifyParams {
    pub ntp_server: IpAddr,
    pub backup_dir: PathBuf,
}

/// Extract the success percentage from a device's raw ping reply.
///
/// A reply without the percent token is malformed and surfaces as an error;
/// the transport succeeded, so the reply is required to be well-formed.
pub fn ping_percent(ping_result: &str) -> Result<u32, FleetProbeError> {
    let pattern = Regex::new(r"(\d+) percent")?;
    let captures = pattern.captures(ping_result).ok_or_else(|| {
        FleetProbeError::Parse("ping reply has no percent token".to_string())
    })?;
    captures[1]
        .parse()
        .map_err(|err| FleetProbeError::Parse(format!("ping percent is not a number: {err}")))
}

/// Probe a target's reachability through the device's own ping.
///
/// Transport failures are expected and yield `Ok(false)`; only a malformed
/// reply from a successful ping is an error.
pub async fn is_alive<S: DeviceSession>(
    session: &mut S,
    target: &str,
) -> Result<bool, FleetProbeError> {
    let reply = match session.ping(target).await {
        Ok(reply) => reply,
        Err(err) => {
            debug!("Ping to {} failed at transport level: {}", target, err);
            return Ok(false);
        }
    };
    Ok(ping_percent(&reply)? > 0)
}

/// Run the full qualification sequence against one device.
///
/// `connect` is awaited as the Connect step; its failure marks the device
/// errored and skips every remaining check. All step outcomes are additive
/// onto the device's single report.
pub async fn qualify_device<S, Fut>(name: &str, connect: Fut, params: &QualifyParams) -> DeviceOutcome
where
    S: DeviceSession,
    Fut: std::future::Future<Output = Result<S, SessionError>>,
{
    let mut outcome = DeviceOutcome::new(name);

    let session = match connect.await {
        Ok(session) => {
            outcome.record(Step::Connect, StepOutcome::Passed("connected".to_string()));
            session
        }
        Err(err) => {
            outcome.record(
                Step::Connect,
                StepOutcome::Errored(format!("connect to device error: {err}")),
            );
            // Abort transition: nothing else can run, and there is no
            // session to tear down.
            let mut step = Step::Backup;
            while step != Step::Disconnect {
                outcome.record(step, StepOutcome::Skipped);
                step = match step.next() {
                    Some(next) => next,
                    None => break,
                };
            }
            outcome.record(Step::Disconnect, StepOutcome::Skipped);
            return outcome;
        }
    };

    let mut runner = StepRunner {
        session,
        params,
        report: &mut outcome.report,
    };

    let mut step = Step::Backup;
    let mut records = Vec::new();
    while step != Step::Disconnect {
        let result = match step {
            Step::Backup => runner.backup().await,
            Step::Cdp => runner.cdp().await,
            Step::Software => runner.software().await,
            Step::Ntp => runner.ntp().await,
            // Connect already ran, Disconnect terminates the loop.
            Step::Connect | Step::Disconnect => StepOutcome::Skipped,
        };
        records.push((step, result));
        step = match step.next() {
            Some(next) => next,
            None => break,
        };
    }

    let disconnect = match runner.session.close().await {
        Ok(()) => StepOutcome::Passed("disconnected".to_string()),
        Err(err) => StepOutcome::Failed(format!("disconnect failed: {err}")),
    };

    for (step, result) in records {
        outcome.record(step, result);
    }
    outcome.record(Step::Disconnect, disconnect);
    outcome
}

struct StepRunner<'a, S: DeviceSession> {
    session: S,
    params: &'a QualifyParams,
    report: &'a mut DeviceReport,
}

impl<S: DeviceSession> StepRunner<'_, S> {
    async fn backup(&mut self) -> StepOutcome {
        let conf = match self.session.execute("show running-config").await {
            Ok(conf) => conf,
            Err(err) => return StepOutcome::Failed(format!("failed to backup: {err}")),
        };

        if let Err(err) = std::fs::create_dir_all(&self.params.backup_dir) {
            return StepOutcome::Failed(format!("failed to create backup dir: {err}"));
        }

        let stamp = chrono::Local::now().format("%d%m%Y_%H%M");
        let path = self
            .params
            .backup_dir
            .join(format!("{}_{}.txt", self.report.name, stamp));
        match std::fs::write(&path, conf) {
            Ok(()) => StepOutcome::Passed(format!("saved to {}", path.display())),
            Err(err) => StepOutcome::Failed(format!("failed to backup: {err}")),
        }
    }

    async fn cdp(&mut self) -> StepOutcome {
        let raw = match self.session.execute("show cdp neighbors").await {
            Ok(raw) => raw,
            Err(err) => return StepOutcome::Failed(format!("CDP not enabled: {err}")),
        };
        let neighbors = match cisco::parse_cdp_neighbors(&raw) {
            Ok(neighbors) => neighbors,
            Err(err) => return StepOutcome::Failed(format!("CDP not enabled: {err}")),
        };

        self.report.cdp_status = CdpStatus::On;
        self.report.neighbor_count = neighbors.len();
        StepOutcome::Passed(format!("CDP is ON, nbrs={}", neighbors.len()))
    }

    async fn software(&mut self) -> StepOutcome {
        let raw = match self.session.execute("show version").await {
            Ok(raw) => raw,
            Err(err) => return StepOutcome::Failed(format!("show version failed: {err}")),
        };
        let version = match cisco::parse_version(&raw) {
            Ok(version) => version,
            Err(err) => return StepOutcome::Failed(format!("show version unparseable: {err}")),
        };

        self.report.hardware = Some(version.platform);
        self.report.software = Some(version.image_id.clone());
        if version.image_id.contains("NPE") {
            self.report.image_class = ImageClass::Npe;
            StepOutcome::Passed(format!(
                "{} image={} with NPE",
                version.version, version.image_id
            ))
        } else {
            StepOutcome::Passed(format!("{} image={} PE", version.version, version.image_id))
        }
    }

    async fn ntp(&mut self) -> StepOutcome {
        let ntp_server = self.params.ntp_server.to_string();
        match is_alive(&mut self.session, &ntp_server).await {
            Ok(true) => {}
            Ok(false) => return StepOutcome::Failed("NTP server unreachable".to_string()),
            Err(err) => return StepOutcome::Failed(format!("malformed ping reply: {err}")),
        }

        let commands = [
            format!("ntp server {ntp_server}"),
            "clock timezone GMT 0 0".to_string(),
        ];
        if let Err(err) = self.session.configure(&commands).await {
            return StepOutcome::Failed(format!("failed to set NTP server: {err}"));
        }
        if let Err(err) = self.session.execute("write memory").await {
            return StepOutcome::Failed(format!("failed to persist config: {err}"));
        }

        let raw = match self.session.execute("show ntp status").await {
            Ok(raw) => raw,
            Err(err) => return StepOutcome::Failed(format!("show ntp status failed: {err}")),
        };
        let status = match cisco::parse_ntp_status(&raw) {
            Ok(status) => status,
            Err(err) => return StepOutcome::Failed(format!("clock status missing: {err}")),
        };
        if !status.is_synchronized() {
            return StepOutcome::Failed(format!("ntp status={}", status.status));
        }

        self.report.clock_state = ClockState::Sync;
        StepOutcome::Passed("clock synchronized".to_string())
    }
}

/// Process-wide report table, injected into every device worker.
///
/// Writes are keyed by device name and never merged; a later write for the
/// same device replaces the earlier one.
#[derive(Debug, Default)]
pub struct ReportTable {
    inner: Mutex<Vec<DeviceOutcome>>,
}

impl ReportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, outcome: DeviceOutcome) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = guard
            .iter_mut()
            .find(|existing| existing.report.name == outcome.report.name)
        {
            *existing = outcome;
        } else {
            guard.push(outcome);
        }
    }

    /// Snapshot of all collected outcomes, in insertion order.
    pub fn snapshot(&self) -> Vec<DeviceOutcome> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}
