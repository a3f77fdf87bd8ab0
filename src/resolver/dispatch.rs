//! UpdateDispatcher - issues oracle updates through the ledger client
//!
//! A cycle's operations are planned up front in a fixed order: one reference
//! time update, then for each entity its current value followed by one fill
//! per timeframe class. Operations are then submitted one at a time. A failed
//! submission is logged with its captured output and the cycle carries on;
//! nothing is retried.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{error, info};

use crate::resolver::types::ResolverError;

/// One on-chain write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOperation {
    /// Global reference time, the current hour as Unix seconds
    SetReferenceTime { timestamp: u64 },
    SetCurrentValue {
        category: u8,
        entity: String,
        value: u64,
    },
    FillActualValue {
        category: u8,
        entity: String,
        timeframe_hours: u64,
        value: u64,
    },
}

impl LedgerOperation {
    /// Module and function the operation calls under the admin address.
    pub fn function(&self) -> (&'static str, &'static str) {
        match self {
            Self::SetReferenceTime { .. } => ("master", "update_time"),
            Self::SetCurrentValue { .. } => ("oracle", "set_value"),
            Self::FillActualValue { .. } => ("master", "fill_actual_values_all"),
        }
    }

    /// Typed CLI arguments in the on-chain function's parameter order.
    pub fn typed_args(&self) -> Vec<String> {
        match self {
            Self::SetReferenceTime { timestamp } => vec![format!("u256:{}", timestamp)],
            Self::SetCurrentValue { category, entity, value } => vec![
                format!("u8:{}", category),
                format!("string:{}", entity),
                format!("u64:{}", value),
            ],
            Self::FillActualValue {
                category,
                entity,
                timeframe_hours,
                value,
            } => vec![
                format!("string:{}", entity),
                format!("u8:{}", category),
                format!("u64:{}", timeframe_hours),
                format!("u64:{}", value),
            ],
        }
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetReferenceTime { timestamp } => write!(f, "set_reference_time({})", timestamp),
            Self::SetCurrentValue { category, entity, value } => {
                write!(f, "set_current_value({}, {}, {})", category, entity, value)
            }
            Self::FillActualValue {
                category,
                entity,
                timeframe_hours,
                value,
            } => write!(
                f,
                "fill_actual_value({}, {}, {}, {})",
                category, entity, timeframe_hours, value
            ),
        }
    }
}

/// Fixed-point encoding sent on-chain: two decimals, separator dropped.
///
/// `123.4` becomes `"123.40"` and then `12340`. Values that round to zero
/// from below (`"-0.00"`) encode as `0`; anything else negative is an error.
pub fn scaled_value(value: f64) -> Result<u64, ResolverError> {
    let scaled = format!("{:.2}", value)
        .replace('.', "")
        .parse::<i64>()
        .map_err(|_| ResolverError::Scaling { value })?;
    u64::try_from(scaled).map_err(|_| ResolverError::Scaling { value })
}

/// Resolved state of one entity, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUpdate {
    pub entity: String,
    pub category: u8,
    pub value: u64,
}

/// Build the ordered operations of one cycle.
pub fn plan_cycle(
    hour: DateTime<Utc>,
    updates: &[EntityUpdate],
    timeframes: &[u64],
) -> Vec<LedgerOperation> {
    let mut ops = Vec::with_capacity(1 + updates.len() * (1 + timeframes.len()));
    ops.push(LedgerOperation::SetReferenceTime {
        timestamp: hour.timestamp().max(0) as u64,
    });

    for update in updates {
        ops.push(LedgerOperation::SetCurrentValue {
            category: update.category,
            entity: update.entity.clone(),
            value: update.value,
        });
        for &timeframe_hours in timeframes {
            ops.push(LedgerOperation::FillActualValue {
                category: update.category,
                entity: update.entity.clone(),
                timeframe_hours,
                value: update.value,
            });
        }
    }
    ops
}

/// Captured result of one ledger client invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Combined stdout and stderr
    pub output: String,
}

/// Contract for the external ledger client.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit one operation and wait for it to finish.
    ///
    /// `Err` means the client could not be invoked at all; a client that ran
    /// and reported failure returns `Ok` with `success == false`.
    async fn submit(&self, op: &LedgerOperation) -> Result<CommandOutput>;
}

/// Ledger client driving the `aptos` command line.
pub struct AptosCliClient {
    binary: String,
    admin_address: String,
    profile: String,
}

impl AptosCliClient {
    pub fn new(
        binary: impl Into<String>,
        admin_address: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            admin_address: admin_address.into(),
            profile: profile.into(),
        }
    }

    /// Full argument list for one operation, binary excluded.
    pub fn command_args(&self, op: &LedgerOperation) -> Vec<String> {
        let (module, function) = op.function();
        let mut args = vec![
            "move".to_string(),
            "run".to_string(),
            "--function-id".to_string(),
            format!("{}::{}::{}", self.admin_address, module, function),
            "--args".to_string(),
        ];
        args.extend(op.typed_args());
        args.extend([
            "--profile".to_string(),
            self.profile.clone(),
            "--assume-yes".to_string(),
        ]);
        args
    }

    /// Shell-like rendering of the command for logs.
    pub fn render(&self, op: &LedgerOperation) -> String {
        format!("{} {}", self.binary, self.command_args(op).join(" "))
    }
}

#[async_trait]
impl LedgerClient for AptosCliClient {
    async fn submit(&self, op: &LedgerOperation) -> Result<CommandOutput> {
        info!("Running: {}", self.render(op));

        let out = Command::new(&self.binary)
            .args(self.command_args(op))
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.binary))?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        Ok(CommandOutput {
            success: out.status.success(),
            output,
        })
    }
}

/// Ledger client that only logs what it would run.
pub struct DryRunClient {
    inner: AptosCliClient,
}

impl DryRunClient {
    pub fn new(inner: AptosCliClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LedgerClient for DryRunClient {
    async fn submit(&self, op: &LedgerOperation) -> Result<CommandOutput> {
        info!("[dry-run] {}", self.inner.render(op));
        Ok(CommandOutput {
            success: true,
            output: String::new(),
        })
    }
}

/// Tally of one cycle's submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub issued: usize,
    pub failed: usize,
}

/// Submits planned operations through a [`LedgerClient`].
pub struct UpdateDispatcher {
    client: Arc<dyn LedgerClient>,
}

impl UpdateDispatcher {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self { client }
    }

    /// Submit one operation; failures are logged, never returned.
    pub async fn dispatch(&self, op: &LedgerOperation) -> bool {
        match self.client.submit(op).await {
            Ok(out) if out.success => {
                info!("{} succeeded: {}", op, out.output.trim());
                true
            }
            Ok(out) => {
                error!("{} failed: {}", op, out.output.trim());
                false
            }
            Err(e) => {
                error!("{} could not be submitted: {:#}", op, e);
                false
            }
        }
    }

    /// Submit operations strictly in order, each awaited before the next.
    pub async fn dispatch_all(&self, ops: &[LedgerOperation]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for op in ops {
            report.issued += 1;
            if !self.dispatch(op).await {
                report.failed += 1;
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct RecordingClient {
        seen: Mutex<Vec<LedgerOperation>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl LedgerClient for RecordingClient {
        async fn submit(&self, op: &LedgerOperation) -> Result<CommandOutput> {
            let index = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(op.clone());
                seen.len() - 1
            };
            if Some(index) == self.fail_on {
                anyhow::bail!("client missing");
            }
            Ok(CommandOutput {
                success: true,
                output: "ok".to_string(),
            })
        }
    }

    fn update(name: &str, category: u8, value: u64) -> EntityUpdate {
        EntityUpdate {
            entity: name.to_string(),
            category,
            value,
        }
    }

    #[test]
    fn test_scaled_value() {
        assert_eq!(scaled_value(123.4).unwrap(), 12340);
        assert_eq!(scaled_value(0.0).unwrap(), 0);
        assert_eq!(scaled_value(99.999).unwrap(), 10000);
        assert_eq!(scaled_value(55.25).unwrap(), 5525);
        assert!(matches!(scaled_value(f64::NAN), Err(ResolverError::Scaling { .. })));
        assert!(matches!(scaled_value(-1.5), Err(ResolverError::Scaling { .. })));
        assert_eq!(scaled_value(-0.001).unwrap(), 0);
        assert!(matches!(scaled_value(1e30), Err(ResolverError::Scaling { .. })));
    }

    #[test]
    fn test_plan_cycle_order() {
        let hour = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();
        let updates = [update("A", 0, 100), update("B", 1, 200)];
        let ops = plan_cycle(hour, &updates, &[1, 2, 4, 6, 8, 24]);

        assert_eq!(ops.len(), 1 + 2 * 7);
        assert_eq!(
            ops[0],
            LedgerOperation::SetReferenceTime {
                timestamp: hour.timestamp() as u64
            }
        );

        let rendered: Vec<String> = ops[1..].iter().map(|op| op.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "set_current_value(0, A, 100)",
                "fill_actual_value(0, A, 1, 100)",
                "fill_actual_value(0, A, 2, 100)",
                "fill_actual_value(0, A, 4, 100)",
                "fill_actual_value(0, A, 6, 100)",
                "fill_actual_value(0, A, 8, 100)",
                "fill_actual_value(0, A, 24, 100)",
                "set_current_value(1, B, 200)",
                "fill_actual_value(1, B, 1, 200)",
                "fill_actual_value(1, B, 2, 200)",
                "fill_actual_value(1, B, 4, 200)",
                "fill_actual_value(1, B, 6, 200)",
                "fill_actual_value(1, B, 8, 200)",
                "fill_actual_value(1, B, 24, 200)",
            ]
        );
    }

    #[test]
    fn test_cli_arguments() {
        let client = AptosCliClient::new("aptos", "0xabc", "default");

        let args = client.command_args(&LedgerOperation::FillActualValue {
            category: 1,
            entity: "Hong Kong".to_string(),
            timeframe_hours: 24,
            value: 5525,
        });
        assert_eq!(
            args,
            vec![
                "move",
                "run",
                "--function-id",
                "0xabc::master::fill_actual_values_all",
                "--args",
                "string:Hong Kong",
                "u8:1",
                "u64:24",
                "u64:5525",
                "--profile",
                "default",
                "--assume-yes",
            ]
        );

        let rendered = client.render(&LedgerOperation::SetReferenceTime { timestamp: 3600 });
        assert_eq!(
            rendered,
            "aptos move run --function-id 0xabc::master::update_time --args u256:3600 \
             --profile default --assume-yes"
        );

        let args = client.command_args(&LedgerOperation::SetCurrentValue {
            category: 0,
            entity: "Sydney".to_string(),
            value: 7,
        });
        assert_eq!(args[3], "0xabc::oracle::set_value");
        assert_eq!(&args[5..8], &["u8:0", "string:Sydney", "u64:7"]);
    }

    #[tokio::test]
    async fn test_failed_dispatch_does_not_stop_cycle() {
        let client = Arc::new(RecordingClient {
            seen: Mutex::new(Vec::new()),
            fail_on: Some(1),
        });
        let dispatcher = UpdateDispatcher::new(client.clone());
        let hour = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ops = plan_cycle(hour, &[update("A", 1, 1)], &[1, 2]);

        let report = dispatcher.dispatch_all(&ops).await;

        assert_eq!(report, DispatchReport { issued: 4, failed: 1 });
        assert_eq!(*client.seen.lock().unwrap(), ops);
    }

    #[tokio::test]
    async fn test_missing_binary_is_logged_not_fatal() {
        let client = Arc::new(AptosCliClient::new(
            "/nonexistent/aptos-binary",
            "0xabc",
            "default",
        ));
        let dispatcher = UpdateDispatcher::new(client);

        let ok = dispatcher
            .dispatch(&LedgerOperation::SetReferenceTime { timestamp: 0 })
            .await;

        assert!(!ok);
    }
}
