//! Sequential fan-out of an action over a list of items
//!
//! Items are processed strictly one at a time: the action for item N+1 is not
//! started until item N's action has completed. What happens after a failure
//! is a construction-time [`ErrorPolicy`]:
//!
//! - [`ErrorPolicy::FailFast`]: the remaining items are skipped and the
//!   operation fails with the first error (create, attach and test flows).
//! - [`ErrorPolicy::ContinueOnError`]: the failure is recorded and the next
//!   item is started; the operation succeeds once every item was attempted
//!   (delete, detach and cleanup flows).
//!
//! A [`CancellationToken`] is checked between items, and an optional deadline
//! bounds each action.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::correlator::EnrichedNode;
use super::inventory::{LiveGroup, LiveNode, LiveVolume};
use super::topology::{DeclaredNode, DeclaredVolume};

/// What to do with the remaining items once an action fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    #[default]
    FailFast,
    ContinueOnError,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::FailFast => write!(f, "fail-fast"),
            ErrorPolicy::ContinueOnError => write!(f, "continue-on-error"),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(ErrorPolicy::FailFast),
            "continue-on-error" => Ok(ErrorPolicy::ContinueOnError),
            other => Err(format!(
                "unknown error policy '{}' (expected fail-fast or continue-on-error)",
                other
            )),
        }
    }
}

/// Errors surfaced by a fan-out operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FanoutError {
    #[error("Action failed on '{item}': {message}")]
    ActionFailed { item: String, message: String },

    #[error("Action on '{item}' timed out after {after:?}")]
    TimedOut { item: String, after: Duration },

    #[error("{operation} aborted at '{item}': {message} ({not_attempted} item(s) not attempted)")]
    Aborted {
        operation: String,
        item: String,
        message: String,
        not_attempted: usize,
    },

    #[error("{operation} cancelled ({not_attempted} item(s) not attempted)")]
    Cancelled {
        operation: String,
        not_attempted: usize,
    },
}

impl FanoutError {
    fn action_failed(item: &str, error: impl fmt::Display) -> Self {
        FanoutError::ActionFailed {
            item: item.to_string(),
            message: error.to_string(),
        }
    }

    /// Text recorded against the item; the item label itself is left out
    /// when the failure came from the action.
    pub fn item_message(&self) -> String {
        match self {
            FanoutError::ActionFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Anything that can be fanned out over: it only needs a name for the log
pub trait FanoutItem {
    fn label(&self) -> String;
}

impl FanoutItem for String {
    fn label(&self) -> String {
        self.clone()
    }
}

impl FanoutItem for LiveNode {
    fn label(&self) -> String {
        self.name.clone()
    }
}

impl FanoutItem for EnrichedNode {
    fn label(&self) -> String {
        self.name.clone()
    }
}

impl FanoutItem for DeclaredNode {
    fn label(&self) -> String {
        self.name.clone()
    }
}

impl FanoutItem for LiveGroup {
    fn label(&self) -> String {
        self.name.clone()
    }
}

impl FanoutItem for LiveVolume {
    fn label(&self) -> String {
        self.name.clone()
    }
}

impl FanoutItem for DeclaredVolume {
    fn label(&self) -> String {
        self.name.clone()
    }
}

// ============================================================================
// Per-item records and the run report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Succeeded,
    Failed,
    /// Never started (fail-fast abort or cancellation)
    Skipped,
}

/// Outcome of one item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item: String,
    pub state: ItemState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Typed failure: `ActionFailed` or `TimedOut`
    #[serde(skip)]
    pub failure: Option<FanoutError>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ItemRecord {
    fn succeeded(item: String, elapsed: Duration) -> Self {
        Self {
            item,
            state: ItemState::Succeeded,
            error: None,
            failure: None,
            duration_ms: elapsed.as_millis() as u64,
            finished_at: Some(Utc::now()),
        }
    }

    fn failed(item: String, elapsed: Duration, failure: FanoutError) -> Self {
        Self {
            item,
            state: ItemState::Failed,
            error: Some(failure.item_message()),
            failure: Some(failure),
            duration_ms: elapsed.as_millis() as u64,
            finished_at: Some(Utc::now()),
        }
    }

    fn skipped(item: String) -> Self {
        Self {
            item,
            state: ItemState::Skipped,
            error: None,
            failure: None,
            duration_ms: 0,
            finished_at: None,
        }
    }
}

/// Result of a fan-out run: one record per input item, in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutReport {
    pub run_id: Uuid,
    pub operation: String,
    pub policy: ErrorPolicy,
    pub records: Vec<ItemRecord>,
    pub cancelled: bool,
}

impl FanoutReport {
    fn new(operation: &str, policy: ErrorPolicy) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation: operation.to_string(),
            policy,
            records: Vec::new(),
            cancelled: false,
        }
    }

    fn count(&self, state: ItemState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(ItemState::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(ItemState::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(ItemState::Skipped)
    }

    /// Items whose action was started
    pub fn attempted(&self) -> usize {
        self.succeeded() + self.failed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemRecord> {
        self.records.iter().filter(|r| r.state == ItemState::Failed)
    }

    /// Typed per-item errors, in input order
    pub fn errors(&self) -> impl Iterator<Item = &FanoutError> {
        self.records.iter().filter_map(|r| r.failure.as_ref())
    }

    /// Overall status: continue-on-error runs succeed despite item failures
    pub fn is_success(&self) -> bool {
        if self.cancelled {
            return false;
        }
        match self.policy {
            ErrorPolicy::FailFast => self.failed() == 0,
            ErrorPolicy::ContinueOnError => true,
        }
    }

    /// Convert into a `Result` following the run's policy
    pub fn into_result(self) -> Result<Self, FanoutError> {
        if self.policy == ErrorPolicy::FailFast {
            if let Some(first) = self.failures().next() {
                return Err(FanoutError::Aborted {
                    operation: self.operation.clone(),
                    item: first.item.clone(),
                    message: first.error.clone().unwrap_or_default(),
                    not_attempted: self.skipped(),
                });
            }
        }
        if self.cancelled {
            return Err(FanoutError::Cancelled {
                operation: self.operation.clone(),
                not_attempted: self.skipped(),
            });
        }
        Ok(self)
    }
}

/// Reports of a two-pass run: expansion of parents, then the sub-items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedReport {
    pub expansion: FanoutReport,
    /// Absent when the expansion pass did not succeed
    pub items: Option<FanoutReport>,
}

impl NestedReport {
    pub fn is_success(&self) -> bool {
        self.expansion.is_success() && self.items.as_ref().is_some_and(|r| r.is_success())
    }

    pub fn into_result(self) -> Result<Self, FanoutError> {
        let expansion = self.expansion.into_result()?;
        let items = self.items.map(FanoutReport::into_result).transpose()?;
        Ok(Self { expansion, items })
    }
}

// ============================================================================
// The iterator
// ============================================================================

#[derive(Debug, Clone)]
pub struct FanoutIterator {
    operation: String,
    policy: ErrorPolicy,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl FanoutIterator {
    pub fn new(operation: impl Into<String>, policy: ErrorPolicy) -> Self {
        Self {
            operation: operation.into(),
            policy,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound every action; an action exceeding it counts as failed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Apply `action` to every item, one at a time
    pub async fn run<T, F, Fut, E>(&self, items: Vec<T>, action: F) -> FanoutReport
    where
        T: FanoutItem,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        self.run_collect(items, action).await.0
    }

    /// Like [`run`](Self::run), collecting the outputs of successful actions
    pub async fn run_collect<T, O, F, Fut, E>(
        &self,
        items: Vec<T>,
        mut action: F,
    ) -> (FanoutReport, Vec<O>)
    where
        T: FanoutItem,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<O, E>>,
        E: fmt::Display,
    {
        let mut report = FanoutReport::new(&self.operation, self.policy);
        let mut outputs = Vec::new();
        let total = items.len();

        info!(
            "Started {} over {} item(s) [{}] ({})",
            self.operation, total, self.policy, report.run_id
        );

        let mut pending = items.into_iter();
        while let Some(item) = pending.next() {
            let label = item.label();

            if self.cancel.is_cancelled() {
                warn!("{} cancelled before '{}'", self.operation, label);
                report.cancelled = true;
                report.records.push(ItemRecord::skipped(label));
                report
                    .records
                    .extend(pending.by_ref().map(|rest| ItemRecord::skipped(rest.label())));
                break;
            }

            debug!("{}: started '{}'", self.operation, label);
            let started = Instant::now();
            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, action(item)).await {
                    Ok(result) => result.map_err(|e| FanoutError::action_failed(&label, e)),
                    Err(_) => Err(FanoutError::TimedOut {
                        item: label.clone(),
                        after: limit,
                    }),
                },
                None => action(item)
                    .await
                    .map_err(|e| FanoutError::action_failed(&label, e)),
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(output) => {
                    info!(
                        "{}: completed '{}' in {}ms",
                        self.operation,
                        label,
                        elapsed.as_millis()
                    );
                    outputs.push(output);
                    report.records.push(ItemRecord::succeeded(label, elapsed));
                }
                Err(failure) => match self.policy {
                    ErrorPolicy::FailFast => {
                        error!("{}: {}", self.operation, failure);
                        report
                            .records
                            .push(ItemRecord::failed(label, elapsed, failure));
                        report
                            .records
                            .extend(pending.by_ref().map(|rest| ItemRecord::skipped(rest.label())));
                        break;
                    }
                    ErrorPolicy::ContinueOnError => {
                        warn!("{}: {}, continuing", self.operation, failure);
                        report
                            .records
                            .push(ItemRecord::failed(label, elapsed, failure));
                    }
                },
            }
        }

        info!(
            "Done {}: {} succeeded, {} failed, {} skipped",
            self.operation,
            report.succeeded(),
            report.failed(),
            report.skipped()
        );

        (report, outputs)
    }

    /// Two-pass fan-out: expand every parent into sub-items, then run the
    /// action over the flattened sub-items in parent order.
    ///
    /// Both passes share this iterator's policy, deadline and cancellation.
    pub async fn run_nested<P, C, X, XFut, XE, F, Fut, E>(
        &self,
        parents: Vec<P>,
        expand: X,
        action: F,
    ) -> NestedReport
    where
        P: FanoutItem,
        C: FanoutItem,
        X: FnMut(P) -> XFut,
        XFut: Future<Output = Result<Vec<C>, XE>>,
        XE: fmt::Display,
        F: FnMut(C) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let expander = Self {
            operation: format!("{} (collect)", self.operation),
            ..self.clone()
        };
        let (expansion, children) = expander.run_collect(parents, expand).await;
        if !expansion.is_success() {
            return NestedReport {
                expansion,
                items: None,
            };
        }

        let children: Vec<C> = children.into_iter().flatten().collect();
        let items = self.run(children, action).await;
        NestedReport {
            expansion,
            items: Some(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn items() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    async fn fail_on_b(item: String) -> Result<(), String> {
        if item == "B" {
            Err("boom".to_string())
        } else {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fail_fast_skips_remaining() {
        let invoked = RefCell::new(Vec::new());
        let report = FanoutIterator::new("test", ErrorPolicy::FailFast)
            .run(items(), |item| {
                invoked.borrow_mut().push(item.clone());
                fail_on_b(item)
            })
            .await;

        assert_eq!(*invoked.borrow(), vec!["A", "B"]);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(!report.is_success());

        match report.into_result() {
            Err(FanoutError::Aborted {
                item,
                message,
                not_attempted,
                ..
            }) => {
                assert_eq!(item, "B");
                assert_eq!(message, "boom");
                assert_eq!(not_attempted, 1);
            }
            other => panic!("Expected abort, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_continue_on_error_attempts_all() {
        let invoked = RefCell::new(Vec::new());
        let report = FanoutIterator::new("test", ErrorPolicy::ContinueOnError)
            .run(items(), |item| {
                invoked.borrow_mut().push(item.clone());
                fail_on_b(item)
            })
            .await;

        assert_eq!(*invoked.borrow(), vec!["A", "B", "C"]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 0);
        assert!(report.is_success());

        let failures: Vec<&str> = report.failures().map(|r| r.item.as_str()).collect();
        assert_eq!(failures, vec!["B"]);
        let errors: Vec<&FanoutError> = report.errors().collect();
        assert_eq!(
            errors,
            vec![&FanoutError::ActionFailed {
                item: "B".to_string(),
                message: "boom".to_string(),
            }]
        );
        assert_eq!(report.failures().next().unwrap().error.as_deref(), Some("boom"));
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_empty_items() {
        let report = FanoutIterator::new("test", ErrorPolicy::FailFast)
            .run(Vec::<String>::new(), fail_on_b)
            .await;
        assert!(report.records.is_empty());
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_strictly_sequential() {
        let log = RefCell::new(Vec::new());
        FanoutIterator::new("test", ErrorPolicy::FailFast)
            .run(items(), |item| {
                let log = &log;
                async move {
                    log.borrow_mut().push(format!("start {}", item));
                    tokio::task::yield_now().await;
                    log.borrow_mut().push(format!("end {}", item));
                    Ok::<(), String>(())
                }
            })
            .await;

        assert_eq!(
            *log.borrow(),
            vec!["start A", "end A", "start B", "end B", "start C", "end C"]
        );
    }

    #[tokio::test]
    async fn test_cancellation_between_items() {
        let token = CancellationToken::new();
        let iterator =
            FanoutIterator::new("test", ErrorPolicy::ContinueOnError).with_cancellation(token.clone());

        let report = iterator
            .run(items(), |item| {
                if item == "A" {
                    token.cancel();
                }
                async { Ok::<(), String>(()) }
            })
            .await;

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 2);
        assert!(report.cancelled);
        assert!(matches!(
            report.into_result(),
            Err(FanoutError::Cancelled { not_attempted: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let report = FanoutIterator::new("test", ErrorPolicy::ContinueOnError)
            .with_timeout(Duration::from_millis(50))
            .run(items(), |item| async move {
                if item == "B" {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        let failure = report.failures().next().unwrap();
        assert!(failure.error.as_deref().unwrap().contains("timed out"));
        assert!(matches!(
            &failure.failure,
            Some(FanoutError::TimedOut { item, .. }) if item == "B"
        ));
    }

    #[tokio::test]
    async fn test_run_collect_outputs() {
        let (report, outputs) = FanoutIterator::new("test", ErrorPolicy::ContinueOnError)
            .run_collect(items(), |item| async move {
                if item == "B" {
                    Err("no".to_string())
                } else {
                    Ok(item.to_lowercase())
                }
            })
            .await;
        assert_eq!(outputs, vec!["a", "c"]);
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_run_nested() {
        let seen = RefCell::new(Vec::new());
        let report = FanoutIterator::new("test", ErrorPolicy::FailFast)
            .run_nested(
                vec!["n1".to_string(), "n2".to_string()],
                |parent| async move {
                    Ok::<_, String>(vec![format!("{}/x", parent), format!("{}/y", parent)])
                },
                |child| {
                    seen.borrow_mut().push(child);
                    async { Ok::<(), String>(()) }
                },
            )
            .await;

        assert!(report.is_success());
        assert_eq!(*seen.borrow(), vec!["n1/x", "n1/y", "n2/x", "n2/y"]);
        assert_eq!(report.items.as_ref().map(|r| r.succeeded()), Some(4));
    }

    #[tokio::test]
    async fn test_run_nested_stops_on_failed_expansion() {
        let report = FanoutIterator::new("test", ErrorPolicy::FailFast)
            .run_nested(
                vec!["n1".to_string(), "n2".to_string()],
                |parent| async move {
                    if parent == "n1" {
                        Err("unreachable daemon".to_string())
                    } else {
                        Ok(vec![parent])
                    }
                },
                |_child: String| async { Ok::<(), String>(()) },
            )
            .await;

        assert!(report.items.is_none());
        assert_eq!(report.expansion.skipped(), 1);
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("fail-fast".parse::<ErrorPolicy>(), Ok(ErrorPolicy::FailFast));
        assert_eq!(
            "continue-on-error".parse::<ErrorPolicy>(),
            Ok(ErrorPolicy::ContinueOnError)
        );
        assert!("retry".parse::<ErrorPolicy>().is_err());
        assert_eq!(ErrorPolicy::ContinueOnError.to_string(), "continue-on-error");
    }
}
