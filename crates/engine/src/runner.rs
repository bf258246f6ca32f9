//! Matrix runner: drives every runnable entry of a [`TestMatrix`] to an outcome.
//!
//! Runs execute on a bounded pool of `workers` concurrent futures. Each run is
//! preflight, submit/poll, output resolution and, for references, a download into
//! `<output_dir>/<host>/<job>/`. Records come back in matrix order.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};
use wpsprobe_types::{HostProfile, ProcessDescriptor, ResolvedRun, WpsError};

use crate::download::Downloader;
use crate::executor::{ExecutionController, PollPolicy};
use crate::matrix::{MatrixEntry, TestMatrix};
use crate::parser::parse_process_description;
use crate::resolve::{OutputResolver, ResolvedOutput};
use crate::transport::{TransportProvider, WpsTransport};

pub const DEFAULT_WORKERS: usize = 4;
/// Wall-clock budget of a whole run, download included.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub workers: usize,
    pub output_dir: PathBuf,
    pub poll: PollPolicy,
    pub run_timeout: Duration,
    /// Check requests against `DescribeProcess` before submitting.
    pub preflight: bool,
}

impl RunnerOptions {
    /// Set the run budget and derive the poll deadline from it.
    ///
    /// Polling gets nine tenths of the budget; the rest is left for output
    /// resolution and the download.
    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self.poll.deadline = run_timeout.saturating_sub(run_timeout / 10);
        self
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            output_dir: PathBuf::from("outputs"),
            poll: PollPolicy::default(),
            run_timeout: DEFAULT_RUN_TIMEOUT,
            preflight: true,
        }
    }
}

/// What a passing run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    File(PathBuf),
    Literal(String),
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::File(path) => write!(f, "{}", path.display()),
            Artifact::Literal(value) => write!(f, "literal '{value}'"),
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Passed { artifact: Artifact },
    Failed { error: WpsError },
    Skipped { reason: String },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Passed { .. } => "passed",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Skipped { .. } => "skipped",
        }
    }

    fn from_error(error: WpsError) -> Self {
        if error.is_configuration() {
            RunOutcome::Skipped { reason: error.to_string() }
        } else {
            RunOutcome::Failed { error }
        }
    }
}

#[derive(Debug)]
pub struct RunRecord {
    pub host: String,
    pub job: String,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
}

/// Serializable view of a [`RunRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub host: String,
    pub job: String,
    pub status: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub elapsed_ms: u64,
}

impl RunRecord {
    pub fn summary(&self) -> RecordSummary {
        let (detail, error_kind) = match &self.outcome {
            RunOutcome::Passed { artifact } => (artifact.to_string(), None),
            RunOutcome::Failed { error } => (error.to_string(), Some(error.kind())),
            RunOutcome::Skipped { reason } => (reason.clone(), None),
        };
        RecordSummary {
            host: self.host.clone(),
            job: self.job.clone(),
            status: self.outcome.label(),
            detail,
            error_kind,
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Every record of one matrix run, in matrix order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub records: Vec<RunRecord>,
}

impl RunReport {
    fn count(&self, label: &str) -> usize {
        self.records.iter().filter(|record| record.outcome.label() == label).count()
    }

    pub fn passed(&self) -> usize {
        self.count("passed")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    /// True iff no run failed; skipped runs do not count against it.
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    pub fn summaries(&self) -> Vec<RecordSummary> {
        self.records.iter().map(RunRecord::summary).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&serde_json::json!({
            "passed": self.passed(),
            "failed": self.failed(),
            "skipped": self.skipped(),
            "runs": self.summaries(),
        }))
    }
}

type DescriptorKey = (String, String);

/// Executes matrix entries against their hosts.
pub struct MatrixRunner {
    provider: Arc<dyn TransportProvider>,
    downloader: Arc<Downloader>,
    options: RunnerOptions,
    transports: Mutex<HashMap<String, Arc<dyn WpsTransport>>>,
    descriptors: Mutex<HashMap<DescriptorKey, Arc<ProcessDescriptor>>>,
}

impl MatrixRunner {
    pub fn new(provider: Arc<dyn TransportProvider>, downloader: Arc<Downloader>, options: RunnerOptions) -> Self {
        Self {
            provider,
            downloader,
            options,
            transports: Mutex::new(HashMap::new()),
            descriptors: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Run every entry of `matrix`; skipped entries are recorded without contacting a server.
    pub async fn run(&self, matrix: &TestMatrix) -> RunReport {
        let workers = self.options.workers.max(1);
        let records = stream::iter(matrix.entries())
            .map(|entry| self.run_entry(entry))
            .buffered(workers)
            .collect::<Vec<_>>()
            .await;

        let report = RunReport { records };
        info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "matrix run complete"
        );
        report
    }

    async fn run_entry(&self, entry: MatrixEntry) -> RunRecord {
        let run = match entry {
            MatrixEntry::Runnable(run) => run,
            MatrixEntry::Skipped { job, host, reason } => {
                info!(host = %host, job = %job, reason = %reason, "run skipped");
                return RunRecord {
                    host,
                    job,
                    outcome: RunOutcome::Skipped { reason },
                    elapsed: Duration::ZERO,
                };
            }
        };

        let started = Instant::now();
        let outcome = match timeout(self.options.run_timeout, self.run_one(&run)).await {
            Ok(Ok(artifact)) => RunOutcome::Passed { artifact },
            Ok(Err(error)) => RunOutcome::from_error(error),
            Err(_) => RunOutcome::Failed {
                error: WpsError::Timeout {
                    process: run.job.process_identifier.clone(),
                    attempts: 0,
                    elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                },
            },
        };
        let elapsed = started.elapsed();

        match &outcome {
            RunOutcome::Passed { artifact } => {
                info!(run = %run.label(), %artifact, elapsed_ms = elapsed.as_millis() as u64, "run passed")
            }
            RunOutcome::Failed { error } => {
                warn!(run = %run.label(), kind = error.kind(), %error, "run failed")
            }
            RunOutcome::Skipped { reason } => info!(run = %run.label(), %reason, "run skipped"),
        }

        RunRecord {
            host: run.host.name.clone(),
            job: run.job.identifier.clone(),
            outcome,
            elapsed,
        }
    }

    async fn run_one(&self, run: &ResolvedRun) -> Result<Artifact, WpsError> {
        let transport = self.transport_for(&run.host).await?;
        let request = run.to_request();

        if self.options.preflight {
            let descriptor = self.descriptor(&run.host, &transport, &request.process_identifier).await?;
            descriptor.check_request(&request)?;
        }

        let controller = ExecutionController::new(Arc::clone(&transport), self.options.poll);
        let result = controller.execute(&request).await?;

        let resolver = OutputResolver::new(transport).with_base(run.host.endpoint.clone());
        match resolver.resolve(&result, &run.job.output_name, run.job.max_chain_depth).await? {
            ResolvedOutput::Literal(value) => Ok(Artifact::Literal(value)),
            ResolvedOutput::Href(href) => {
                let url = run
                    .host
                    .endpoint
                    .join(&href)
                    .map_err(|error| WpsError::download(&href, format!("invalid href: {error}")))?;
                let destination = self.options.output_dir.join(&run.host.name).join(&run.job.identifier);
                let path = self.downloader.fetch(url.as_str(), &destination, run.job.strip_download).await?;
                Ok(Artifact::File(path))
            }
        }
    }

    async fn transport_for(&self, host: &HostProfile) -> Result<Arc<dyn WpsTransport>, WpsError> {
        let mut transports = self.transports.lock().await;
        if let Some(transport) = transports.get(&host.name) {
            return Ok(Arc::clone(transport));
        }
        let transport = self.provider.transport_for(host)?;
        transports.insert(host.name.clone(), Arc::clone(&transport));
        Ok(transport)
    }

    /// Cached `DescribeProcess` per host and process; the fetch happens outside the lock.
    async fn descriptor(
        &self,
        host: &HostProfile,
        transport: &Arc<dyn WpsTransport>,
        process: &str,
    ) -> Result<Arc<ProcessDescriptor>, WpsError> {
        let key = (host.name.clone(), process.to_string());
        if let Some(descriptor) = self.descriptors.lock().await.get(&key) {
            return Ok(Arc::clone(descriptor));
        }

        debug!(host = %host.name, process, "fetching process description");
        let body = transport.describe_process(process).await?;
        let descriptor = Arc::new(parse_process_description(&body, process)?);
        let mut descriptors = self.descriptors.lock().await;
        Ok(Arc::clone(descriptors.entry(key).or_insert(descriptor)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use wpsprobe_registry::{ConfigStore, JobCatalog};
    use wpsprobe_types::{ExecutionRequest, JobDefinition, ParamSpec};

    use super::*;
    use crate::executor::tests::status_document;
    use crate::matrix::HostSelector;

    const DESCRIPTIONS: &str = r#"<wps:ProcessDescriptions xmlns:wps="http://www.opengis.net/wps/1.0.0" xmlns:ows="http://www.opengis.net/ows/1.1">
  <ProcessDescription><ows:Identifier>echo</ows:Identifier>
    <DataInputs><Input><ows:Identifier>text</ows:Identifier></Input></DataInputs>
    <ProcessOutputs><Output><ows:Identifier>output</ows:Identifier></Output></ProcessOutputs>
  </ProcessDescription>
  <ProcessDescription><ows:Identifier>broken</ows:Identifier>
    <DataInputs><Input><ows:Identifier>text</ows:Identifier></Input></DataInputs>
    <ProcessOutputs><Output><ows:Identifier>output</ows:Identifier></Output></ProcessOutputs>
  </ProcessDescription>
</wps:ProcessDescriptions>"#;

    /// Answers `echo` with the literal input and fails `broken`.
    #[derive(Default)]
    struct EchoServer {
        describes: AtomicUsize,
    }

    #[async_trait]
    impl WpsTransport for EchoServer {
        async fn describe_process(&self, _identifier: &str) -> Result<Bytes, WpsError> {
            self.describes.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(DESCRIPTIONS.as_bytes()))
        }

        async fn execute(&self, request: &ExecutionRequest) -> Result<Bytes, WpsError> {
            let document = match request.process_identifier.as_str() {
                "echo" => {
                    let text = request.inputs.iter().map(|(_, value)| value.as_str()).collect::<Vec<_>>().join("+");
                    status_document(
                        "echo",
                        "<wps:ProcessSucceeded/>",
                        &format!(
                            "<wps:ProcessOutputs><wps:Output><ows:Identifier>output</ows:Identifier><wps:Data><wps:LiteralData>{text}</wps:LiteralData></wps:Data></wps:Output></wps:ProcessOutputs>"
                        ),
                        None,
                    )
                }
                "slow" => status_document("slow", "<wps:ProcessAccepted/>", "", Some("http://wps/status/slow.xml")),
                other => status_document(other, "<wps:ProcessFailed>boom</wps:ProcessFailed>", "", None),
            };
            Ok(Bytes::from(document))
        }

        async fn fetch_status(&self, location: &str) -> Result<Bytes, WpsError> {
            assert_eq!(location, "http://wps/status/slow.xml");
            Ok(Bytes::from(status_document("slow", "<wps:ProcessAccepted/>", "", None)))
        }

        async fn fetch_document(&self, href: &str) -> Result<Bytes, WpsError> {
            Err(WpsError::transport(format!("unexpected fetch of {href}")))
        }
    }

    struct SingleServer(Arc<EchoServer>);

    impl TransportProvider for SingleServer {
        fn transport_for(&self, _host: &HostProfile) -> Result<Arc<dyn WpsTransport>, WpsError> {
            Ok(self.0.clone())
        }
    }

    fn matrix(jobs: Vec<JobDefinition>, yaml: &str) -> TestMatrix {
        let catalog = Arc::new(JobCatalog::new(jobs).unwrap());
        let store = Arc::new(ConfigStore::from_yaml_str(yaml).unwrap());
        TestMatrix::build(catalog, store, &HostSelector::All).unwrap()
    }

    fn runner(server: Arc<EchoServer>, options: RunnerOptions) -> MatrixRunner {
        let downloader = Arc::new(Downloader::with_timeouts(Duration::from_secs(5), Duration::from_secs(5)).unwrap());
        MatrixRunner::new(Arc::new(SingleServer(server)), downloader, options)
    }

    fn echo_job(identifier: &str, process: &str) -> JobDefinition {
        JobDefinition::new(identifier, "output")
            .with_process(process)
            .with_param("text", ParamSpec::from_config())
    }

    #[tokio::test]
    async fn outcomes_are_classified_in_matrix_order() {
        let jobs = vec![
            echo_job("echo", "echo"),
            echo_job("broken", "broken"),
            echo_job("unconfigured", "echo"),
            JobDefinition::new("undeclared", "output")
                .with_process("echo")
                .with_param("bogus", ParamSpec::literal("x")),
        ];
        let yaml = "default:\n  echo/text: hi\n  broken/text: hi\nh:\n  wps: http://h/wps\n";
        let server = Arc::new(EchoServer::default());
        let options = RunnerOptions {
            workers: 1,
            ..RunnerOptions::default()
        };
        let report = runner(server.clone(), options).run(&matrix(jobs, yaml)).await;

        let statuses: Vec<_> = report
            .records
            .iter()
            .map(|record| (record.job.as_str(), record.outcome.label()))
            .collect();
        assert_eq!(
            statuses,
            vec![("echo", "passed"), ("broken", "failed"), ("unconfigured", "skipped"), ("undeclared", "failed")]
        );
        assert!(matches!(
            &report.records[0].outcome,
            RunOutcome::Passed { artifact: Artifact::Literal(value) } if value == "hi"
        ));
        assert!(matches!(&report.records[1].outcome, RunOutcome::Failed { error: WpsError::ProcessFailed(_) }));
        assert!(matches!(&report.records[3].outcome, RunOutcome::Failed { error: WpsError::Preflight { .. } }));
        assert_eq!((report.passed(), report.failed(), report.skipped()), (1, 2, 1));
        assert!(!report.all_passed());
        // One description per (host, process): echo and broken.
        assert_eq!(server.describes.load(Ordering::SeqCst), 2);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["failed"], 2);
        assert_eq!(json["runs"][1]["error_kind"], "process_failed");
        assert!(json["runs"][0].get("error_kind").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_deadline_turns_into_timeout() {
        let jobs = vec![JobDefinition::new("slow", "output")];
        let options = RunnerOptions {
            preflight: false,
            run_timeout: Duration::from_secs(30),
            ..RunnerOptions::default()
        };
        let report = runner(Arc::new(EchoServer::default()), options)
            .run(&matrix(jobs, "h:\n  wps: http://h/wps\n"))
            .await;

        assert_eq!(report.records.len(), 1);
        assert!(matches!(&report.records[0].outcome, RunOutcome::Failed { error: WpsError::Timeout { .. } }));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_deadline_trips_before_the_run_deadline() {
        let jobs = vec![JobDefinition::new("slow", "output")];
        let options = RunnerOptions {
            preflight: false,
            ..RunnerOptions::default()
        }
        .with_run_timeout(Duration::from_secs(30));
        assert_eq!(options.poll.deadline, Duration::from_secs(27));

        let report = runner(Arc::new(EchoServer::default()), options)
            .run(&matrix(jobs, "h:\n  wps: http://h/wps\n"))
            .await;

        let RunOutcome::Failed {
            error: WpsError::Timeout { attempts, elapsed_ms, .. },
        } = &report.records[0].outcome
        else {
            panic!("expected a timeout, got {:?}", report.records[0].outcome);
        };
        assert!(*attempts > 0, "attempts: {attempts}");
        assert!(*elapsed_ms < 30_000, "elapsed: {elapsed_ms}ms");
    }

    #[tokio::test]
    async fn skipped_only_reports_still_pass() {
        let jobs = vec![echo_job("echo", "echo")];
        let report = runner(Arc::new(EchoServer::default()), RunnerOptions::default())
            .run(&matrix(jobs, "h:\n  wps: http://h/wps\n"))
            .await;
        assert_eq!(report.skipped(), 1);
        assert!(report.all_passed());
    }
}
